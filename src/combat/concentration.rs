use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::boost::{AbilityScore, BoostEvaluator, RollType};
use crate::combat::rng::Rng;
use crate::combat::world::CombatWorld;

/// One caster's ongoing concentration and the statuses it sustains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concentration {
    pub caster_id: String,
    pub ability_id: String,
    pub status_id: Option<String>,
    pub target_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConcentrationCheck {
    pub caster_id: String,
    pub dc: i32,
    pub natural: u32,
    pub total: i32,
    pub maintained: bool,
}

pub trait ConcentrationTracker {
    /// Starts concentrating; an existing concentration of the caster ends first.
    fn begin(&mut self, world: &mut CombatWorld, concentration: Concentration);
    /// Rolls a Constitution save for a damaged concentrator. `None` if not concentrating.
    fn on_damage(
        &mut self,
        world: &mut CombatWorld,
        actor_id: &str,
        damage: i32,
        rng: &mut Rng,
    ) -> Option<ConcentrationCheck>;
    fn current(&self, caster_id: &str) -> Option<&Concentration>;
    fn end(&mut self, world: &mut CombatWorld, caster_id: &str) -> Option<Concentration>;
}

#[derive(Debug, Clone, Default)]
pub struct ConcentrationLedger {
    active: BTreeMap<String, Concentration>,
}

impl ConcentrationLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn concentration_dc(damage: i32) -> i32 {
    (damage / 2).max(10)
}

impl ConcentrationTracker for ConcentrationLedger {
    fn begin(&mut self, world: &mut CombatWorld, concentration: Concentration) {
        self.end(world, &concentration.caster_id);
        self.active
            .insert(concentration.caster_id.clone(), concentration);
    }

    fn on_damage(
        &mut self,
        world: &mut CombatWorld,
        actor_id: &str,
        damage: i32,
        rng: &mut Rng,
    ) -> Option<ConcentrationCheck> {
        if damage <= 0 || !self.active.contains_key(actor_id) {
            return None;
        }
        let caster = world.combatant(actor_id)?;
        let dc = concentration_dc(damage);
        let mut bonus = caster.ability_modifier(AbilityScore::Constitution);
        if caster.is_save_proficient(AbilityScore::Constitution) {
            bonus += caster.proficiency();
        }
        bonus += BoostEvaluator::new(&caster.boosts).roll_bonus_flat(RollType::SavingThrow);
        let alive = caster.is_alive();
        let natural = rng.d20();
        let total = natural as i32 + bonus;
        let maintained = alive && total >= dc;
        if !maintained {
            debug!(caster = actor_id, dc, total, "concentration broken");
            self.end(world, actor_id);
        }
        Some(ConcentrationCheck {
            caster_id: actor_id.to_string(),
            dc,
            natural,
            total,
            maintained,
        })
    }

    fn current(&self, caster_id: &str) -> Option<&Concentration> {
        self.active.get(caster_id)
    }

    fn end(&mut self, world: &mut CombatWorld, caster_id: &str) -> Option<Concentration> {
        let concentration = self.active.remove(caster_id)?;
        if let Some(status_id) = &concentration.status_id {
            for target in &concentration.target_ids {
                world.remove_status(target, status_id);
            }
        }
        Some(concentration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::combatant::Combatant;

    fn setup() -> (CombatWorld, ConcentrationLedger) {
        let mut world = CombatWorld::new();
        world.add_combatant(Combatant::new("cleric", "party", 20)).expect("add");
        world.add_combatant(Combatant::new("orc", "enemy", 20)).expect("add");
        world.apply_status("orc", "HELD", "cleric", None).expect("apply");
        let mut ledger = ConcentrationLedger::new();
        ledger.begin(
            &mut world,
            Concentration {
                caster_id: "cleric".to_string(),
                ability_id: "hold_person".to_string(),
                status_id: Some("HELD".to_string()),
                target_ids: vec!["orc".to_string()],
            },
        );
        (world, ledger)
    }

    #[test]
    fn dc_is_half_damage_with_floor_ten() {
        assert_eq!(concentration_dc(7), 10);
        assert_eq!(concentration_dc(30), 15);
    }

    #[test]
    fn ending_removes_linked_status() {
        let (mut world, mut ledger) = setup();
        assert!(world.statuses.is_active("orc", "HELD"));
        ledger.end(&mut world, "cleric");
        assert!(!world.statuses.is_active("orc", "HELD"));
        assert!(ledger.current("cleric").is_none());
    }

    #[test]
    fn huge_damage_breaks_concentration() {
        let (mut world, mut ledger) = setup();
        let check = ledger
            .on_damage(&mut world, "cleric", 80, &mut Rng::new(1))
            .expect("concentrating");
        assert_eq!(check.dc, 40);
        assert!(!check.maintained);
        assert!(!world.statuses.is_active("orc", "HELD"));
    }

    #[test]
    fn no_check_without_concentration() {
        let (mut world, mut ledger) = setup();
        assert!(ledger.on_damage(&mut world, "orc", 5, &mut Rng::new(1)).is_none());
    }
}
