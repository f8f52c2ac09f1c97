//! Stateless domain queries over a [BoostContainer].
//!
//! Aggregation rules differ per boost kind and are part of the contract:
//! resistances and critical-hit overrides take the strongest result, numeric bonuses
//! sum, multipliers multiply, presence-only boosts (immunities, attributes, tags) union.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::boost::condition::EvaluationContext;
use crate::boost::container::BoostContainer;
use crate::boost::types::{AbilityScore, ActiveBoost, BoostType, ResistanceLevel, RollType};
use crate::combat::dice::{clamp_i64, DiceFormula};

/// Integer boost parameters are `i64`; aggregates saturate into `i32`.
trait ClampedSum: Iterator<Item = i64> + Sized {
    fn clamped_sum(self) -> i32 {
        clamp_i64(self.fold(0, i64::saturating_add))
    }
}

impl<I: Iterator<Item = i64>> ClampedSum for I {}

/// Critical-hit overrides. Both flags can be set at once; callers decide precedence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CriticalHitModifier {
    pub auto_crit: bool,
    pub never_crit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RerollRule {
    /// Natural results at or below this value are rerolled.
    pub threshold: i32,
    /// Keep the reroll even when it is lower.
    pub always_keep_new: bool,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeaponDamageBonus {
    pub formula: String,
    pub damage_type: Option<String>,
}

#[derive(Clone, Copy)]
pub struct BoostEvaluator<'a> {
    boosts: &'a BoostContainer,
    context: Option<EvaluationContext<'a>>,
}

impl<'a> BoostEvaluator<'a> {
    pub fn new(boosts: &'a BoostContainer) -> Self {
        Self {
            boosts,
            context: None,
        }
    }

    /// Makes conditional boosts eligible, evaluated against `context`.
    pub fn with_context(mut self, context: EvaluationContext<'a>) -> Self {
        self.context = Some(context);
        self
    }

    fn relevant(&self, boost_type: BoostType) -> Vec<&'a ActiveBoost> {
        self.boosts.query(boost_type, self.context.as_ref())
    }

    fn sum_int(&self, boost_type: BoostType, index: usize) -> i32 {
        self.relevant(boost_type)
            .iter()
            .filter_map(|b| b.definition.int_param(index))
            .clamped_sum()
    }

    fn string_set(&self, boost_type: BoostType, index: usize) -> BTreeSet<String> {
        self.relevant(boost_type)
            .iter()
            .filter_map(|b| b.definition.param(index))
            .map(|p| p.to_string().trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn roll_boosts(
        &self,
        boost_type: BoostType,
        roll_type: RollType,
        ability: Option<AbilityScore>,
    ) -> Vec<&'a ActiveBoost> {
        self.relevant(boost_type)
            .into_iter()
            .filter(|b| {
                let Some(keyword) = b.definition.str_param(0) else {
                    return false;
                };
                if !roll_type.matches_keyword(keyword) {
                    return false;
                }
                match b.definition.str_param(1).and_then(|p| p.parse::<AbilityScore>().ok()) {
                    Some(required) => ability == Some(required),
                    None => true,
                }
            })
            .collect()
    }

    pub fn has_advantage(&self, roll_type: RollType, ability: Option<AbilityScore>) -> bool {
        !self.roll_boosts(BoostType::Advantage, roll_type, ability).is_empty()
    }

    pub fn has_disadvantage(&self, roll_type: RollType, ability: Option<AbilityScore>) -> bool {
        !self.roll_boosts(BoostType::Disadvantage, roll_type, ability).is_empty()
    }

    /// Source ids of the advantage boosts that apply, for roll breakdowns.
    pub fn advantage_sources(
        &self,
        roll_type: RollType,
        ability: Option<AbilityScore>,
    ) -> Vec<String> {
        self.roll_boosts(BoostType::Advantage, roll_type, ability)
            .iter()
            .map(|b| b.source_id.clone())
            .collect()
    }

    pub fn disadvantage_sources(
        &self,
        roll_type: RollType,
        ability: Option<AbilityScore>,
    ) -> Vec<String> {
        self.roll_boosts(BoostType::Disadvantage, roll_type, ability)
            .iter()
            .map(|b| b.source_id.clone())
            .collect()
    }

    /// Sum of every `AC(n)`. AC boosts stack.
    pub fn ac_bonus(&self) -> i32 {
        self.sum_int(BoostType::AC, 0)
    }

    /// Best `ACOverrideFormula(base, flag, ability...)` result. Every ability named from
    /// parameter index 2 onward adds its modifier; index 1 is metadata.
    pub fn ac_override<F>(&self, modifier: F) -> Option<i32>
    where
        F: Fn(AbilityScore) -> i32,
    {
        self.relevant(BoostType::ACOverrideFormula)
            .iter()
            .filter_map(|b| {
                let base = clamp_i64(b.definition.int_param(0)?);
                let bonus: i32 = b
                    .definition
                    .parameters
                    .iter()
                    .skip(2)
                    .filter_map(|p| p.as_str().and_then(|s| s.parse::<AbilityScore>().ok()))
                    .map(&modifier)
                    .sum();
                Some(base.saturating_add(bonus))
            })
            .max()
    }

    /// Sum of `DamageBonus(value, type)` where type is empty or matches.
    pub fn damage_bonus(&self, damage_type: &str) -> i32 {
        self.relevant(BoostType::DamageBonus)
            .iter()
            .filter(|b| {
                b.definition
                    .param(1)
                    .map(|p| p.to_string())
                    .map_or(true, |t| {
                        t.trim().is_empty() || t.trim().eq_ignore_ascii_case(damage_type)
                    })
            })
            .filter_map(|b| b.definition.int_param(0))
            .clamped_sum()
    }

    /// Immune > Resistant > Normal > Vulnerable. Immune returns immediately; vulnerability
    /// only wins when nothing better was seen.
    pub fn resistance_level(&self, damage_type: &str) -> ResistanceLevel {
        let mut resistant = false;
        let mut vulnerable = false;
        let mut explicit_normal = false;
        for boost in self.relevant(BoostType::Resistance) {
            let Some(kind) = boost.definition.str_param(0) else {
                continue;
            };
            if !(kind.eq_ignore_ascii_case(damage_type) || kind.eq_ignore_ascii_case("All")) {
                continue;
            }
            let level = boost
                .definition
                .str_param(1)
                .and_then(|l| l.parse::<ResistanceLevel>().ok());
            match level {
                Some(ResistanceLevel::Immune) => return ResistanceLevel::Immune,
                Some(ResistanceLevel::Resistant) => resistant = true,
                Some(ResistanceLevel::Normal) => explicit_normal = true,
                Some(ResistanceLevel::Vulnerable) => vulnerable = true,
                None => {}
            }
        }
        if resistant {
            ResistanceLevel::Resistant
        } else if vulnerable && !explicit_normal {
            ResistanceLevel::Vulnerable
        } else {
            ResistanceLevel::Normal
        }
    }

    /// `IgnoreResistance(type, level)`: the attacker bypasses that level (and weaker) for the type.
    pub fn ignored_resistance(&self, damage_type: &str) -> Option<ResistanceLevel> {
        self.relevant(BoostType::IgnoreResistance)
            .iter()
            .filter(|b| {
                b.definition
                    .str_param(0)
                    .map_or(false, |t| {
                        t.eq_ignore_ascii_case(damage_type) || t.eq_ignore_ascii_case("All")
                    })
            })
            .filter_map(|b| b.definition.str_param(1)?.parse::<ResistanceLevel>().ok())
            .max()
    }

    /// Upper-cased union of every `StatusImmunity(id)`.
    pub fn status_immunities(&self) -> BTreeSet<String> {
        self.string_set(BoostType::StatusImmunity, 0)
    }

    pub fn is_immune_to_status(&self, status_id: &str) -> bool {
        self.status_immunities()
            .contains(&status_id.trim().to_ascii_uppercase())
    }

    pub fn attributes(&self) -> BTreeSet<String> {
        self.string_set(BoostType::Attribute, 0)
    }

    pub fn tags(&self) -> BTreeSet<String> {
        self.string_set(BoostType::Tag, 0)
    }

    pub fn unlocked_spells(&self) -> BTreeSet<String> {
        self.string_set(BoostType::UnlockSpell, 0)
    }

    pub fn unlocked_interrupts(&self) -> BTreeSet<String> {
        self.string_set(BoostType::UnlockInterrupt, 0)
    }

    pub fn is_non_lethal(&self) -> bool {
        !self.relevant(BoostType::NonLethal).is_empty()
    }

    pub fn blocks_spellcasting(&self) -> bool {
        !self.relevant(BoostType::BlockSpellCast).is_empty()
    }

    pub fn has_two_weapon_fighting(&self) -> bool {
        !self.relevant(BoostType::TwoWeaponFighting).is_empty()
    }

    /// Product of `ActionResourceMultiplier(Movement, percent, _)`.
    pub fn movement_multiplier(&self) -> f64 {
        self.relevant(BoostType::ActionResourceMultiplier)
            .iter()
            .filter(|b| b.definition.param(0).map_or(false, |p| p.is("Movement")))
            .filter_map(|b| b.definition.param(1).and_then(|p| p.as_f64()))
            .fold(1.0, |acc, pct| acc * pct / 100.0)
    }

    pub fn movement_bonus(&self) -> i32 {
        self.sum_int(BoostType::MovementSpeedBonus, 0)
    }

    /// Sum of `ActionResource(name, amount, ...)` for the named resource.
    pub fn resource_modifier(&self, resource: &str) -> i32 {
        self.relevant(BoostType::ActionResource)
            .iter()
            .filter(|b| b.definition.param(0).map_or(false, |p| p.is(resource)))
            .filter_map(|b| b.definition.int_param(1))
            .clamped_sum()
    }

    pub fn is_resource_blocked(&self, resource: &str) -> bool {
        self.relevant(BoostType::ActionResourceBlock)
            .iter()
            .any(|b| b.definition.param(0).map_or(false, |p| p.is(resource)))
    }

    /// `CriticalHit(scope, Success|Never, ...)` for `scope` (`AttackRoll` for the attacker,
    /// `AttackTarget` for the defender).
    pub fn critical_hit_modifier(&self, scope: &str) -> CriticalHitModifier {
        let mut modifier = CriticalHitModifier::default();
        for boost in self.relevant(BoostType::CriticalHit) {
            if !boost.definition.param(0).map_or(false, |p| p.is(scope)) {
                continue;
            }
            match boost.definition.param(1) {
                Some(p) if p.is("Success") => modifier.auto_crit = true,
                Some(p) if p.is("Never") => modifier.never_crit = true,
                _ => {}
            }
        }
        modifier
    }

    pub fn critical_hit_extra_range(&self) -> i32 {
        self.sum_int(BoostType::CriticalHitExtraRange, 0)
    }

    pub fn critical_hit_extra_dice(&self) -> i32 {
        self.sum_int(BoostType::CriticalHitExtraDice, 0)
    }

    /// Numeric `RollBonus(rollType, n)` entries summed.
    pub fn roll_bonus_flat(&self, roll_type: RollType) -> i32 {
        self.roll_boosts(BoostType::RollBonus, roll_type, None)
            .iter()
            .filter_map(|b| match b.definition.param(1) {
                Some(p) if p.as_str().is_none() => p.as_int(),
                _ => None,
            })
            .clamped_sum()
    }

    /// Dice-valued `RollBonus(rollType, 1d4)` entries (e.g. Bless).
    pub fn roll_bonus_dice(&self, roll_type: RollType) -> Vec<DiceFormula> {
        self.roll_boosts(BoostType::RollBonus, roll_type, None)
            .iter()
            .filter_map(|b| b.definition.str_param(1)?.parse::<DiceFormula>().ok())
            .filter(DiceFormula::has_dice)
            .collect()
    }

    /// Magnitude of negative flat attack roll bonuses.
    pub fn attack_roll_penalty(&self) -> i32 {
        self.roll_boosts(BoostType::RollBonus, RollType::AttackRoll, None)
            .iter()
            .filter_map(|b| match b.definition.param(1) {
                Some(p) if p.as_str().is_none() => p.as_int(),
                _ => None,
            })
            .filter(|v| *v < 0)
            .map(i64::saturating_neg)
            .clamped_sum()
    }

    /// `ProficiencyBonus(category, name)`, e.g. `ProficiencyBonus(SavingThrow, Dexterity)`.
    pub fn has_proficiency(&self, category: &str, name: &str) -> bool {
        self.relevant(BoostType::ProficiencyBonus).iter().any(|b| {
            b.definition.param(0).map_or(false, |p| p.is(category))
                && b.definition.param(1).map_or(false, |p| p.is(name))
        })
    }

    pub fn proficiency_bonus_override(&self) -> Option<i32> {
        self.relevant(BoostType::ProficiencyBonusOverride)
            .iter()
            .filter_map(|b| b.definition.int_param(0))
            .max()
            .map(clamp_i64)
    }

    pub fn has_expertise(&self, skill: &str) -> bool {
        self.relevant(BoostType::ExpertiseBonus)
            .iter()
            .any(|b| b.definition.param(0).map_or(false, |p| p.is(skill)))
    }

    /// `Reroll(rollType, threshold, alwaysKeepNew)`.
    pub fn reroll_rules(&self, roll_type: RollType) -> Vec<RerollRule> {
        self.roll_boosts(BoostType::Reroll, roll_type, None)
            .iter()
            .filter_map(|b| {
                let threshold = clamp_i64(b.definition.int_param(1)?);
                let always_keep_new = b.definition.param(2).map_or(false, |p| {
                    p.is("true") || p.as_int() == Some(1)
                });
                Some(RerollRule {
                    threshold,
                    always_keep_new,
                    source_id: b.source_id.clone(),
                })
            })
            .collect()
    }

    /// Highest `MinimumRollResult(rollType, n)` floor.
    pub fn minimum_roll_result(&self, roll_type: RollType) -> Option<i32> {
        self.roll_boosts(BoostType::MinimumRollResult, roll_type, None)
            .iter()
            .filter_map(|b| b.definition.int_param(1))
            .max()
            .map(clamp_i64)
    }

    pub fn initiative_bonus(&self) -> i32 {
        self.sum_int(BoostType::Initiative, 0)
    }

    pub fn max_hp_bonus(&self) -> i32 {
        self.sum_int(BoostType::IncreaseMaxHP, 0)
    }

    /// Temporary hit points do not stack; the largest grant wins.
    pub fn temporary_hp(&self) -> i32 {
        self.relevant(BoostType::TemporaryHP)
            .iter()
            .filter_map(|b| b.definition.int_param(0))
            .max()
            .map_or(0, clamp_i64)
    }

    /// Sum of `DamageReduction(type, kind, amount)` for the type (or `All`).
    pub fn damage_reduction(&self, damage_type: &str) -> i32 {
        self.relevant(BoostType::DamageReduction)
            .iter()
            .filter(|b| {
                b.definition
                    .str_param(0)
                    .map_or(false, |t| {
                        t.eq_ignore_ascii_case(damage_type) || t.eq_ignore_ascii_case("All")
                    })
            })
            .filter_map(|b| b.definition.int_param(2).or_else(|| b.definition.int_param(1)))
            .clamped_sum()
    }

    pub fn spell_save_dc_bonus(&self) -> i32 {
        self.sum_int(BoostType::SpellSaveDC, 0)
    }

    /// Sum of `Ability(score, n)` for one score.
    pub fn ability_bonus(&self, ability: AbilityScore) -> i32 {
        self.relevant(BoostType::Ability)
            .iter()
            .filter(|b| {
                b.definition
                    .str_param(0)
                    .and_then(|s| s.parse::<AbilityScore>().ok())
                    == Some(ability)
            })
            .filter_map(|b| b.definition.int_param(1))
            .clamped_sum()
    }

    /// Highest `AbilityOverrideMinimum(score, n)` floor for the score.
    pub fn ability_override_minimum(&self, ability: AbilityScore) -> Option<i32> {
        self.relevant(BoostType::AbilityOverrideMinimum)
            .iter()
            .filter(|b| {
                b.definition
                    .str_param(0)
                    .and_then(|s| s.parse::<AbilityScore>().ok())
                    == Some(ability)
            })
            .filter_map(|b| b.definition.int_param(1))
            .max()
            .map(clamp_i64)
    }

    /// `WeaponDamage(formula, type)` and `CharacterWeaponDamage(formula, type)` riders.
    pub fn weapon_damage_bonuses(&self) -> Vec<WeaponDamageBonus> {
        [BoostType::WeaponDamage, BoostType::CharacterWeaponDamage]
            .into_iter()
            .flat_map(|t| self.relevant(t))
            .filter_map(|b| {
                let formula = b.definition.param(0)?.to_string();
                Some(WeaponDamageBonus {
                    formula,
                    damage_type: b.definition.str_param(1).map(str::to_string),
                })
            })
            .collect()
    }
}

/// What is being asked of a container: a boost type plus the optional facts narrowing it.
#[derive(Debug, Clone, Default)]
pub struct BoostQuery {
    pub boost_type: Option<BoostType>,
    pub roll_type: Option<RollType>,
    pub ability: Option<AbilityScore>,
    pub damage_type: Option<String>,
    pub actor_id: Option<String>,
    pub target_id: Option<String>,
}

impl BoostQuery {
    pub fn of(boost_type: BoostType) -> Self {
        Self {
            boost_type: Some(boost_type),
            ..Self::default()
        }
    }

    pub fn roll(mut self, roll_type: RollType, ability: Option<AbilityScore>) -> Self {
        self.roll_type = Some(roll_type);
        self.ability = ability;
        self
    }

    pub fn damage(mut self, damage_type: impl Into<String>) -> Self {
        self.damage_type = Some(damage_type.into());
        self
    }

    pub fn between(mut self, actor_id: impl Into<String>, target_id: Option<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self.target_id = target_id;
        self
    }
}

impl BoostEvaluator<'_> {
    /// Answers a [BoostQuery] as a signed number: presence queries yield 0/1, numeric ones
    /// their aggregate. Used by tooling that asks questions generically.
    pub fn answer(&self, query: &BoostQuery) -> i32 {
        let Some(boost_type) = query.boost_type else {
            return 0;
        };
        match (boost_type, query.roll_type) {
            (BoostType::Advantage, Some(roll)) => self.has_advantage(roll, query.ability) as i32,
            (BoostType::Disadvantage, Some(roll)) => {
                self.has_disadvantage(roll, query.ability) as i32
            }
            (BoostType::RollBonus, Some(roll)) => self.roll_bonus_flat(roll),
            (BoostType::AC, _) => self.ac_bonus(),
            (BoostType::DamageBonus, _) => {
                self.damage_bonus(query.damage_type.as_deref().unwrap_or(""))
            }
            (BoostType::Initiative, _) => self.initiative_bonus(),
            (BoostType::IncreaseMaxHP, _) => self.max_hp_bonus(),
            (BoostType::SpellSaveDC, _) => self.spell_save_dc_bonus(),
            (BoostType::TemporaryHP, _) => self.temporary_hp(),
            (BoostType::MovementSpeedBonus, _) => self.movement_bonus(),
            (BoostType::CriticalHitExtraRange, _) => self.critical_hit_extra_range(),
            (BoostType::CriticalHitExtraDice, _) => self.critical_hit_extra_dice(),
            (other, _) => (!self.relevant(other).is_empty()) as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boost::parser::parse_boosts;

    fn container(entries: &[(&str, &str, &str)]) -> BoostContainer {
        let mut container = BoostContainer::new();
        for (text, source, id) in entries {
            container.add_all(parse_boosts(text), source, id).expect("add");
        }
        container
    }

    #[test]
    fn advantage_respects_ability_filter() {
        let boosts = container(&[("Advantage(SavingThrow, Wisdom)", "Passive", "p")]);
        let eval = BoostEvaluator::new(&boosts);
        assert!(eval.has_advantage(RollType::SavingThrow, Some(AbilityScore::Wisdom)));
        assert!(!eval.has_advantage(RollType::SavingThrow, Some(AbilityScore::Dexterity)));
        assert!(!eval.has_advantage(RollType::SavingThrow, None));
        assert!(!eval.has_advantage(RollType::AttackRoll, None));
    }

    #[test]
    fn ac_override_uses_abilities_after_index_one() {
        let boosts = container(&[
            ("ACOverrideFormula(10, 0, Dexterity, Constitution)", "Passive", "unarmored"),
            ("ACOverrideFormula(13, 1, Dexterity)", "Status", "mage_armor"),
        ]);
        let eval = BoostEvaluator::new(&boosts);
        let modifier = |a: AbilityScore| match a {
            AbilityScore::Dexterity => 2,
            AbilityScore::Constitution => 4,
            _ => 0,
        };
        // 10 + 2 + 4 beats 13 + 2; the flag parameter adds nothing.
        assert_eq!(eval.ac_override(modifier), Some(16));
        let none = BoostContainer::new();
        assert_eq!(BoostEvaluator::new(&none).ac_override(modifier), None);
    }

    #[test]
    fn damage_bonus_filters_by_type() {
        let boosts = container(&[
            ("DamageBonus(2, Slashing)", "Passive", "a"),
            ("DamageBonus(1)", "Passive", "b"),
            ("DamageBonus(5, fire)", "Passive", "c"),
        ]);
        let eval = BoostEvaluator::new(&boosts);
        assert_eq!(eval.damage_bonus("slashing"), 3);
        assert_eq!(eval.damage_bonus("Fire"), 6);
        assert_eq!(eval.damage_bonus("Cold"), 1);
    }

    #[test]
    fn movement_multiplies_and_resources_add() {
        let boosts = container(&[
            ("ActionResourceMultiplier(Movement, 200, 0)", "Status", "dash"),
            ("ActionResourceMultiplier(Movement, 50, 0)", "Status", "slow"),
            ("ActionResource(SpellSlot, 1, 1);ActionResource(SpellSlot, 2, 1)", "Feat", "f"),
        ]);
        let eval = BoostEvaluator::new(&boosts);
        assert!((eval.movement_multiplier() - 1.0).abs() < 1e-9);
        assert_eq!(eval.resource_modifier("SpellSlot"), 3);
    }

    #[test]
    fn critical_flags_are_independent() {
        let boosts = container(&[
            ("CriticalHit(AttackRoll, Success, Always)", "Status", "a"),
            ("CriticalHit(AttackRoll, Never)", "Status", "b"),
        ]);
        let modifier = BoostEvaluator::new(&boosts).critical_hit_modifier("AttackRoll");
        assert!(modifier.auto_crit && modifier.never_crit);
    }

    #[test]
    fn roll_bonus_splits_flat_and_dice() {
        let boosts = container(&[
            ("RollBonus(Attack, 1d4)", "Status", "BLESSED"),
            ("RollBonus(AttackRoll, -2)", "Status", "BANE_LITE"),
            ("RollBonus(SavingThrow, 1)", "Equipment", "cloak"),
        ]);
        let eval = BoostEvaluator::new(&boosts);
        assert_eq!(eval.roll_bonus_dice(RollType::AttackRoll), vec![DiceFormula::new(1, 4, 0)]);
        assert_eq!(eval.roll_bonus_flat(RollType::AttackRoll), -2);
        assert_eq!(eval.attack_roll_penalty(), 2);
        assert_eq!(eval.roll_bonus_flat(RollType::SavingThrow), 1);
    }

    #[test]
    fn temporary_hp_takes_max_and_presence_sets_union() {
        let boosts = container(&[
            ("TemporaryHP(5);TemporaryHP(8)", "Status", "a"),
            ("Tag(undead);Tag(UNDEAD);Attribute(Grounded)", "Passive", "b"),
        ]);
        let eval = BoostEvaluator::new(&boosts);
        assert_eq!(eval.temporary_hp(), 8);
        assert_eq!(eval.tags().len(), 1);
        assert!(eval.attributes().contains("GROUNDED"));
    }

    #[test]
    fn oversized_parameters_saturate() {
        let boosts = container(&[
            ("AC(3000000000);AC(3000000000)", "Status", "a"),
            ("TemporaryHP(9000000000);ActionResource(Movement, -9000000000)", "Status", "b"),
        ]);
        let eval = BoostEvaluator::new(&boosts);
        assert_eq!(eval.ac_bonus(), i32::MAX);
        assert_eq!(eval.temporary_hp(), i32::MAX);
        assert_eq!(eval.resource_modifier("Movement"), i32::MIN);
    }
}
