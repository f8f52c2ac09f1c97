//! d20 attack and saving-throw resolution.
//!
//! [RollService] is the seam the ability pipeline rolls through; tests swap in
//! scripted services. [D20RollService] is the standard implementation.

use serde::Serialize;

use crate::boost::{AbilityScore, RerollRule};
use crate::combat::dice::DiceFormula;
use crate::combat::rng::Rng;

pub const DEFAULT_CRITICAL_THRESHOLD: u32 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RollMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl RollMode {
    /// Any advantage and any disadvantage cancel out, whatever the counts.
    pub fn from_sources(advantage: &[String], disadvantage: &[String]) -> Self {
        match (advantage.is_empty(), disadvantage.is_empty()) {
            (false, true) => Self::Advantage,
            (true, false) => Self::Disadvantage,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackQuery {
    pub attacker_id: String,
    pub target_id: String,
    pub attack_bonus: i32,
    pub target_ac: i32,
    pub advantage_sources: Vec<String>,
    pub disadvantage_sources: Vec<String>,
    pub critical_threshold: u32,
    pub auto_crit: bool,
    pub never_crit: bool,
    pub bonus_dice: Vec<DiceFormula>,
    pub rerolls: Vec<RerollRule>,
    pub minimum_natural: Option<i32>,
}

impl AttackQuery {
    pub fn new(attacker_id: &str, target_id: &str, attack_bonus: i32, target_ac: i32) -> Self {
        Self {
            attacker_id: attacker_id.to_string(),
            target_id: target_id.to_string(),
            attack_bonus,
            target_ac,
            advantage_sources: Vec::new(),
            disadvantage_sources: Vec::new(),
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            auto_crit: false,
            never_crit: false,
            bonus_dice: Vec::new(),
            rerolls: Vec::new(),
            minimum_natural: None,
        }
    }

    pub fn mode(&self) -> RollMode {
        RollMode::from_sources(&self.advantage_sources, &self.disadvantage_sources)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackRollResult {
    pub natural: u32,
    pub rolls: Vec<u32>,
    pub mode: RollMode,
    pub total: i32,
    pub hit: bool,
    pub critical: bool,
    pub fumble: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveQuery {
    pub actor_id: String,
    pub ability: AbilityScore,
    pub save_bonus: i32,
    pub dc: i32,
    pub advantage_sources: Vec<String>,
    pub disadvantage_sources: Vec<String>,
    pub bonus_dice: Vec<DiceFormula>,
    pub rerolls: Vec<RerollRule>,
    pub minimum_natural: Option<i32>,
    /// Critical failure without rolling (paralyzed or stunned against Str/Dex).
    pub auto_fail: bool,
}

impl SaveQuery {
    pub fn new(actor_id: &str, ability: AbilityScore, save_bonus: i32, dc: i32) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            ability,
            save_bonus,
            dc,
            advantage_sources: Vec::new(),
            disadvantage_sources: Vec::new(),
            bonus_dice: Vec::new(),
            rerolls: Vec::new(),
            minimum_natural: None,
            auto_fail: false,
        }
    }

    pub fn mode(&self) -> RollMode {
        RollMode::from_sources(&self.advantage_sources, &self.disadvantage_sources)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveRollResult {
    pub natural: u32,
    pub rolls: Vec<u32>,
    pub mode: RollMode,
    pub total: i32,
    pub dc: i32,
    pub success: bool,
    pub critical_failure: bool,
    /// Decided without a die roll.
    pub forced: bool,
}

impl SaveRollResult {
    pub fn auto_fail(query: &SaveQuery) -> Self {
        Self {
            natural: 1,
            rolls: Vec::new(),
            mode: RollMode::Normal,
            total: 1 + query.save_bonus,
            dc: query.dc,
            success: false,
            critical_failure: true,
            forced: true,
        }
    }

    /// Deterministic pass at base value, used when a rule window cancels the roll.
    pub fn forced_pass(query: &SaveQuery) -> Self {
        Self {
            natural: 0,
            rolls: Vec::new(),
            mode: RollMode::Normal,
            total: query.dc.max(query.save_bonus),
            dc: query.dc,
            success: true,
            critical_failure: false,
            forced: true,
        }
    }
}

pub trait RollService {
    fn roll_attack(&mut self, query: &AttackQuery, rng: &mut Rng) -> AttackRollResult;
    fn roll_save(&mut self, query: &SaveQuery, rng: &mut Rng) -> SaveRollResult;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct D20RollService;

impl RollService for D20RollService {
    fn roll_attack(&mut self, query: &AttackQuery, rng: &mut Rng) -> AttackRollResult {
        let (natural, rolls) = roll_d20(query.mode(), &query.rerolls, query.minimum_natural, rng);
        let extra: i32 = query.bonus_dice.iter().map(|d| d.roll(rng)).sum();
        resolve_attack(query, natural, rolls, extra)
    }

    fn roll_save(&mut self, query: &SaveQuery, rng: &mut Rng) -> SaveRollResult {
        if query.auto_fail {
            return SaveRollResult::auto_fail(query);
        }
        let (natural, rolls) = roll_d20(query.mode(), &query.rerolls, query.minimum_natural, rng);
        let extra: i32 = query.bonus_dice.iter().map(|d| d.roll(rng)).sum();
        resolve_save(query, natural, rolls, extra)
    }
}

fn roll_d20(
    mode: RollMode,
    rerolls: &[RerollRule],
    minimum: Option<i32>,
    rng: &mut Rng,
) -> (u32, Vec<u32>) {
    let single = |rng: &mut Rng| {
        let first = rng.d20();
        match rerolls.iter().find(|r| first as i32 <= r.threshold) {
            Some(rule) => {
                let second = rng.d20();
                if rule.always_keep_new {
                    second
                } else {
                    first.max(second)
                }
            }
            None => first,
        }
    };
    let first = single(rng);
    let (natural, rolls) = match mode {
        RollMode::Normal => (first, vec![first]),
        RollMode::Advantage => {
            let second = single(rng);
            (first.max(second), vec![first, second])
        }
        RollMode::Disadvantage => {
            let second = single(rng);
            (first.min(second), vec![first, second])
        }
    };
    let natural = match minimum {
        Some(floor) if floor > natural as i32 => floor.clamp(1, 20) as u32,
        _ => natural,
    };
    (natural, rolls)
}

/// Natural 1 always misses; natural 20 (or the lowered threshold) always hits and crits.
/// `auto_crit` upgrades any hit; `never_crit` wins over both.
pub fn resolve_attack(
    query: &AttackQuery,
    natural: u32,
    rolls: Vec<u32>,
    extra: i32,
) -> AttackRollResult {
    let total = natural as i32 + query.attack_bonus + extra;
    let fumble = natural == 1;
    let threshold_crit = natural >= query.critical_threshold.clamp(2, 20);
    let hit = !fumble && (threshold_crit || total >= query.target_ac);
    let critical = hit && !query.never_crit && (threshold_crit || query.auto_crit);
    AttackRollResult {
        natural,
        rolls,
        mode: query.mode(),
        total,
        hit,
        critical,
        fumble,
    }
}

pub fn resolve_save(
    query: &SaveQuery,
    natural: u32,
    rolls: Vec<u32>,
    extra: i32,
) -> SaveRollResult {
    let total = natural as i32 + query.save_bonus + extra;
    SaveRollResult {
        natural,
        rolls,
        mode: query.mode(),
        total,
        dc: query.dc,
        success: total >= query.dc,
        critical_failure: natural == 1,
        forced: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advantage_and_disadvantage_cancel() {
        let adv = vec!["HIDDEN".to_string(), "RECKLESS".to_string()];
        let dis = vec!["PRONE".to_string()];
        assert_eq!(RollMode::from_sources(&adv, &dis), RollMode::Normal);
        assert_eq!(RollMode::from_sources(&adv, &[]), RollMode::Advantage);
        assert_eq!(RollMode::from_sources(&[], &dis), RollMode::Disadvantage);
    }

    #[test]
    fn natural_one_misses_and_twenty_crits() {
        let query = AttackQuery::new("a", "b", 30, 10);
        assert!(!resolve_attack(&query, 1, vec![1], 0).hit);
        let top = resolve_attack(&AttackQuery::new("a", "b", -10, 30), 20, vec![20], 0);
        assert!(top.hit && top.critical);
    }

    #[test]
    fn auto_crit_needs_a_hit_and_never_crit_wins() {
        let mut query = AttackQuery::new("a", "b", 5, 15);
        query.auto_crit = true;
        assert!(!resolve_attack(&query, 4, vec![4], 0).critical);
        assert!(resolve_attack(&query, 12, vec![12], 0).critical);
        query.never_crit = true;
        let result = resolve_attack(&query, 20, vec![20], 0);
        assert!(result.hit && !result.critical);
    }

    #[test]
    fn lowered_threshold_crits_earlier() {
        let mut query = AttackQuery::new("a", "b", 0, 25);
        query.critical_threshold = 19;
        let result = resolve_attack(&query, 19, vec![19], 0);
        assert!(result.hit && result.critical);
    }

    #[test]
    fn save_compares_total_to_dc() {
        let query = SaveQuery::new("a", AbilityScore::Dexterity, 3, 14);
        assert!(resolve_save(&query, 11, vec![11], 0).success);
        assert!(!resolve_save(&query, 10, vec![10], 0).success);
        let forced = SaveRollResult::auto_fail(&query);
        assert!(forced.critical_failure && !forced.success);
    }

    #[test]
    fn seeded_rolls_repeat() {
        let mut query = AttackQuery::new("a", "b", 4, 12);
        query.advantage_sources.push("HIDDEN".to_string());
        let mut service = D20RollService;
        let first = service.roll_attack(&query, &mut Rng::new(9));
        let second = service.roll_attack(&query, &mut Rng::new(9));
        assert_eq!(first, second);
        assert_eq!(first.rolls.len(), 2);
    }
}
