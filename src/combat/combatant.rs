use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::boost::{AbilityScore, BoostContainer, BoostEvaluator};
use crate::combat::budget::{ActionBudget, ResourcePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::uniform(10)
    }
}

impl AbilityScores {
    pub const fn uniform(score: i32) -> Self {
        Self {
            strength: score,
            dexterity: score,
            constitution: score,
            intelligence: score,
            wisdom: score,
            charisma: score,
        }
    }

    pub fn get(&self, ability: AbilityScore) -> i32 {
        match ability {
            AbilityScore::Strength => self.strength,
            AbilityScore::Dexterity => self.dexterity,
            AbilityScore::Constitution => self.constitution,
            AbilityScore::Intelligence => self.intelligence,
            AbilityScore::Wisdom => self.wisdom,
            AbilityScore::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: AbilityScore, score: i32) {
        match ability {
            AbilityScore::Strength => self.strength = score,
            AbilityScore::Dexterity => self.dexterity = score,
            AbilityScore::Constitution => self.constitution = score,
            AbilityScore::Intelligence => self.intelligence = score,
            AbilityScore::Wisdom => self.wisdom = score,
            AbilityScore::Charisma => self.charisma = score,
        }
    }
}

/// 5e modifier: `floor((score - 10) / 2)`.
pub fn score_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    /// Dice formula, e.g. `1d8`.
    pub damage: String,
    pub damage_type: String,
    #[serde(default)]
    pub finesse: bool,
    #[serde(default)]
    pub thrown: bool,
    #[serde(default)]
    pub ranged: bool,
    #[serde(default = "default_true")]
    pub proficient: bool,
}

impl Weapon {
    pub fn melee(name: &str, damage: &str, damage_type: &str) -> Self {
        Self {
            name: name.to_string(),
            damage: damage.to_string(),
            damage_type: damage_type.to_string(),
            finesse: false,
            thrown: false,
            ranged: false,
            proficient: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub faction: String,
    #[serde(default)]
    pub ability_scores: AbilityScores,
    #[serde(default = "default_proficiency")]
    pub proficiency_bonus: i32,
    pub max_hp: i32,
    pub hp: i32,
    #[serde(default)]
    pub temp_hp: i32,
    #[serde(default = "default_ac")]
    pub base_ac: i32,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub weapon: Option<Weapon>,
    #[serde(default)]
    pub spellcasting_ability: Option<AbilityScore>,
    #[serde(default)]
    pub save_proficiencies: BTreeSet<AbilityScore>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub boosts: BoostContainer,
    #[serde(default)]
    pub budget: ActionBudget,
    #[serde(default)]
    pub resources: ResourcePool,
}

fn default_proficiency() -> i32 {
    2
}

fn default_ac() -> i32 {
    10
}

impl Combatant {
    pub fn new(id: impl Into<String>, faction: impl Into<String>, max_hp: i32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            faction: faction.into(),
            ability_scores: AbilityScores::default(),
            proficiency_bonus: default_proficiency(),
            max_hp,
            hp: max_hp,
            temp_hp: 0,
            base_ac: default_ac(),
            position: Position::default(),
            weapon: None,
            spellcasting_ability: None,
            save_proficiencies: BTreeSet::new(),
            tags: BTreeSet::new(),
            boosts: BoostContainer::new(),
            budget: ActionBudget::default(),
            resources: ResourcePool::new(),
        }
    }

    pub fn with_scores(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = scores;
        self
    }

    pub fn with_ac(mut self, base_ac: i32) -> Self {
        self.base_ac = base_ac;
        self
    }

    pub fn with_weapon(mut self, weapon: Weapon) -> Self {
        self.weapon = Some(weapon);
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn is_hostile_to(&self, other: &Combatant) -> bool {
        !self.faction.eq_ignore_ascii_case(&other.faction)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
            || BoostEvaluator::new(&self.boosts)
                .tags()
                .contains(&tag.to_ascii_uppercase())
    }

    /// Score after `Ability` boosts, floored by any `AbilityOverrideMinimum`.
    pub fn ability_score(&self, ability: AbilityScore) -> i32 {
        let evaluator = BoostEvaluator::new(&self.boosts);
        let boosted = self.ability_scores.get(ability) + evaluator.ability_bonus(ability);
        match evaluator.ability_override_minimum(ability) {
            Some(floor) => boosted.max(floor),
            None => boosted,
        }
    }

    pub fn ability_modifier(&self, ability: AbilityScore) -> i32 {
        score_modifier(self.ability_score(ability))
    }

    /// Ability behind a weapon attack: finesse takes the better of Str and Dex, ranged
    /// weapons use Dex, everything else (thrown included) uses Str.
    pub fn weapon_attack_ability(&self, ranged_attack: bool) -> AbilityScore {
        let better_of_str_dex = || {
            if self.ability_modifier(AbilityScore::Dexterity)
                > self.ability_modifier(AbilityScore::Strength)
            {
                AbilityScore::Dexterity
            } else {
                AbilityScore::Strength
            }
        };
        match &self.weapon {
            Some(weapon) if weapon.finesse => better_of_str_dex(),
            Some(weapon) if weapon.ranged => AbilityScore::Dexterity,
            Some(weapon) if weapon.thrown => AbilityScore::Strength,
            _ if ranged_attack => AbilityScore::Dexterity,
            _ => AbilityScore::Strength,
        }
    }

    /// Declared spellcasting ability, else the best mental score.
    pub fn spell_ability(&self) -> AbilityScore {
        self.spellcasting_ability.unwrap_or_else(|| {
            [AbilityScore::Intelligence, AbilityScore::Wisdom, AbilityScore::Charisma]
                .into_iter()
                .max_by_key(|a| (self.ability_modifier(*a), std::cmp::Reverse(*a as u8)))
                .unwrap_or(AbilityScore::Intelligence)
        })
    }

    pub fn proficiency(&self) -> i32 {
        BoostEvaluator::new(&self.boosts)
            .proficiency_bonus_override()
            .unwrap_or(self.proficiency_bonus)
    }

    pub fn is_save_proficient(&self, ability: AbilityScore) -> bool {
        self.save_proficiencies.contains(&ability)
            || BoostEvaluator::new(&self.boosts).has_proficiency("SavingThrow", ability.as_str())
    }

    /// `max(base AC, best ACOverrideFormula) + sum of AC boosts`.
    pub fn effective_ac(&self) -> i32 {
        let evaluator = BoostEvaluator::new(&self.boosts);
        let base = evaluator
            .ac_override(|a| self.ability_modifier(a))
            .map_or(self.base_ac, |over| over.max(self.base_ac));
        base + evaluator.ac_bonus()
    }

    pub fn effective_max_hp(&self) -> i32 {
        self.max_hp + BoostEvaluator::new(&self.boosts).max_hp_bonus()
    }

    /// Applies damage to temporary HP first. Returns HP actually lost.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let amount = amount.max(0);
        let absorbed = amount.min(self.temp_hp);
        self.temp_hp -= absorbed;
        let through = amount - absorbed;
        let floor = if BoostEvaluator::new(&self.boosts).is_non_lethal() {
            1
        } else {
            0
        };
        let before = self.hp;
        self.hp = self.hp.saturating_sub(through).max(floor.min(self.hp));
        before - self.hp
    }

    /// Heals up to effective max HP. Returns HP actually restored.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp + amount.max(0)).min(self.effective_max_hp());
        (self.hp - before).max(0)
    }

    /// Temporary HP does not stack: the larger pool is kept.
    pub fn grant_temp_hp(&mut self, amount: i32) -> i32 {
        if amount > self.temp_hp {
            self.temp_hp = amount;
        }
        self.temp_hp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boost::parse_boosts;

    #[test]
    fn modifier_floors_negative_scores() {
        assert_eq!(score_modifier(10), 0);
        assert_eq!(score_modifier(9), -1);
        assert_eq!(score_modifier(16), 3);
        assert_eq!(score_modifier(1), -5);
    }

    #[test]
    fn effective_ac_adds_boosts_to_best_base() {
        let mut monk = Combatant::new("monk", "party", 20).with_ac(12);
        monk.ability_scores.dexterity = 16;
        monk.ability_scores.wisdom = 14;
        monk.boosts.add_all(
            parse_boosts("ACOverrideFormula(10,false,Dexterity,Wisdom)"),
            "Passive",
            "unarmored_defense",
        ).expect("add");
        assert_eq!(monk.effective_ac(), 15);
        monk.boosts.add_all(parse_boosts("AC(2)"), "Status", "SHIELD_OF_FAITH").expect("add");
        assert_eq!(monk.effective_ac(), 17);
    }

    #[test]
    fn temp_hp_soaks_damage_first() {
        let mut target = Combatant::new("t", "enemy", 10);
        target.grant_temp_hp(4);
        assert_eq!(target.take_damage(6), 2);
        assert_eq!(target.temp_hp, 0);
        assert_eq!(target.hp, 8);
    }

    #[test]
    fn non_lethal_keeps_one_hp() {
        let mut target = Combatant::new("t", "enemy", 5);
        target.boosts.add_all(parse_boosts("NonLethal()"), "Status", "SUBDUED").expect("add");
        target.take_damage(50);
        assert_eq!(target.hp, 1);
    }

    #[test]
    fn finesse_weapon_picks_better_of_str_and_dex() {
        let mut rogue = Combatant::new("r", "party", 10).with_weapon(Weapon {
            finesse: true,
            ..Weapon::melee("rapier", "1d8", "Piercing")
        });
        rogue.ability_scores.dexterity = 18;
        assert_eq!(rogue.weapon_attack_ability(false), AbilityScore::Dexterity);
        rogue.ability_scores.strength = 20;
        assert_eq!(rogue.weapon_attack_ability(false), AbilityScore::Strength);
    }

    #[test]
    fn spell_ability_defaults_to_best_mental_score() {
        let mut cleric = Combatant::new("c", "party", 10);
        cleric.ability_scores.wisdom = 16;
        assert_eq!(cleric.spell_ability(), AbilityScore::Wisdom);
        cleric.spellcasting_ability = Some(AbilityScore::Charisma);
        assert_eq!(cleric.spell_ability(), AbilityScore::Charisma);
    }

    #[test]
    fn ability_override_minimum_floors_score() {
        let mut ogre = Combatant::new("o", "enemy", 30);
        ogre.boosts.add_all(
            parse_boosts("AbilityOverrideMinimum(Strength,19)"),
            "Equipment",
            "gauntlets",
        ).expect("add");
        assert_eq!(ogre.ability_score(AbilityScore::Strength), 19);
        assert_eq!(ogre.ability_modifier(AbilityScore::Strength), 4);
    }
}
