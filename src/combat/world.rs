//! The roster of one encounter plus its status bookkeeping.
//!
//! Combatants are looked up by id. Status boosts carry the provenance
//! `("Status", status_id)` so expiry removes exactly what was granted.

use std::collections::BTreeMap;

use tracing::debug;

use crate::boost::{parse_boosts, source, BoostEvaluator, ProvenanceError};
use crate::combat::combatant::Combatant;
use crate::combat::status::{
    ActiveStatus, StatusApplication, StatusDefinition, StatusManager, StatusQuery, StatusService,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("unknown combatant '{0}'")]
    UnknownCombatant(String),
    #[error("duplicate combatant id '{0}'")]
    DuplicateCombatant(String),
    #[error(transparent)]
    Provenance(#[from] ProvenanceError),
}

#[derive(Debug, Clone)]
pub struct CombatWorld {
    combatants: BTreeMap<String, Combatant>,
    pub statuses: StatusManager,
    pub round: u32,
}

impl Default for CombatWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl CombatWorld {
    pub fn new() -> Self {
        Self {
            combatants: BTreeMap::new(),
            statuses: StatusManager::with_core_conditions(),
            round: 1,
        }
    }

    pub fn add_combatant(&mut self, combatant: Combatant) -> Result<(), WorldError> {
        if self.combatants.contains_key(&combatant.id) {
            return Err(WorldError::DuplicateCombatant(combatant.id));
        }
        self.combatants.insert(combatant.id.clone(), combatant);
        Ok(())
    }

    pub fn register_status(&mut self, definition: StatusDefinition) {
        self.statuses.register(definition);
    }

    pub fn combatant(&self, id: &str) -> Option<&Combatant> {
        self.combatants.get(id)
    }

    pub fn combatant_mut(&mut self, id: &str) -> Option<&mut Combatant> {
        self.combatants.get_mut(id)
    }

    pub fn combatants(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.combatants.keys().cloned().collect()
    }

    fn require(&self, id: &str) -> Result<&Combatant, WorldError> {
        self.combatants
            .get(id)
            .ok_or_else(|| WorldError::UnknownCombatant(id.to_string()))
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut Combatant, WorldError> {
        self.combatants
            .get_mut(id)
            .ok_or_else(|| WorldError::UnknownCombatant(id.to_string()))
    }

    /// Living combatants of a different faction within `range` of `actor_id`.
    pub fn hostiles_within(&self, actor_id: &str, range: f32) -> Vec<&Combatant> {
        let Some(actor) = self.combatants.get(actor_id) else {
            return Vec::new();
        };
        self.combatants
            .values()
            .filter(|c| c.id != actor.id && c.is_alive() && c.is_hostile_to(actor))
            .filter(|c| c.position.distance(&actor.position) <= range)
            .collect()
    }

    /// Alive and not held by an incapacitating status.
    pub fn is_active(&self, actor_id: &str) -> bool {
        self.combatants
            .get(actor_id)
            .map_or(false, |c| c.is_alive() && !self.statuses.is_incapacitated(actor_id))
    }

    pub fn distance(&self, a: &str, b: &str) -> Option<f32> {
        let (a, b) = (self.combatants.get(a)?, self.combatants.get(b)?);
        Some(a.position.distance(&b.position))
    }

    /// Applies a status, granting its boosts unless the target is immune. A status already
    /// present is refreshed and its boosts are not granted twice.
    pub fn apply_status(
        &mut self,
        target_id: &str,
        status_id: &str,
        source_id: &str,
        duration: Option<u32>,
    ) -> Result<StatusApplication, WorldError> {
        let target = self.require(target_id)?;
        if status_id.trim().is_empty() {
            return Err(ProvenanceError::EmptySourceId(source::STATUS.to_string()).into());
        }
        if BoostEvaluator::new(&target.boosts).is_immune_to_status(status_id) {
            debug!(target = target_id, status = status_id, "status blocked by immunity");
            return Ok(StatusApplication::Immune);
        }
        let duration = duration.or_else(|| {
            self.statuses
                .definition(status_id)
                .and_then(|d| d.default_duration)
        });
        let outcome = self.statuses.insert(ActiveStatus {
            status_id: status_id.to_string(),
            target_id: target_id.to_string(),
            source_id: source_id.to_string(),
            remaining_turns: duration,
        });
        if outcome == StatusApplication::Applied {
            let boosts = self.statuses.boosts_for(status_id).to_vec();
            let target = self.require_mut(target_id)?;
            target.boosts.add_all(boosts, source::STATUS, status_id)?;
        }
        Ok(outcome)
    }

    /// Removes a status and every boost it granted. Returns false if it was not active.
    pub fn remove_status(&mut self, target_id: &str, status_id: &str) -> bool {
        if self.statuses.remove(target_id, status_id).is_none() {
            return false;
        }
        if let Some(target) = self.combatants.get_mut(target_id) {
            target.boosts.remove_from(source::STATUS, status_id);
        }
        true
    }

    /// Turn-start duration tick for one actor. Returns expired status ids.
    pub fn tick_statuses(&mut self, actor_id: &str) -> Vec<String> {
        let expired = self.statuses.tick(actor_id);
        if let Some(actor) = self.combatants.get_mut(actor_id) {
            for status in &expired {
                actor.boosts.remove_from(source::STATUS, &status.status_id);
            }
        }
        expired.into_iter().map(|s| s.status_id).collect()
    }

    /// Parses and grants a boost string with the given provenance. Returns how many boosts
    /// were added.
    pub fn grant_boosts(
        &mut self,
        actor_id: &str,
        source: &str,
        source_id: &str,
        boosts: &str,
    ) -> Result<usize, WorldError> {
        let definitions = parse_boosts(boosts);
        let added = self
            .require_mut(actor_id)?
            .boosts
            .add_all(definitions, source, source_id)?;
        Ok(added)
    }

    pub fn revoke_boosts(
        &mut self,
        actor_id: &str,
        source: &str,
        source_id: &str,
    ) -> Result<usize, WorldError> {
        Ok(self.require_mut(actor_id)?.boosts.remove_from(source, source_id))
    }

    /// Drops every status and its boosts; end of encounter.
    pub fn clear_statuses(&mut self) {
        for status in self.statuses.clear() {
            if let Some(target) = self.combatants.get_mut(&status.target_id) {
                target.boosts.remove_from(source::STATUS, &status.status_id);
            }
        }
    }

    pub fn start_turn(&mut self, actor_id: &str) -> Vec<String> {
        if let Some(actor) = self.combatants.get_mut(actor_id) {
            actor.budget.reset_for_turn();
        }
        self.tick_statuses(actor_id)
    }
}

impl StatusQuery for CombatWorld {
    fn has_status(&self, actor_id: &str, status_id: &str) -> bool {
        self.statuses.has_status(actor_id, status_id)
    }

    fn status_ids(&self, actor_id: &str) -> Vec<String> {
        self.statuses.status_ids(actor_id)
    }
}

impl StatusService for CombatWorld {
    fn remove_statuses_on_attack(&mut self, actor_id: &str) -> Vec<String> {
        let ids = self.statuses.remove_on_attack_ids(actor_id);
        for id in &ids {
            self.remove_status(actor_id, id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::status::ids;

    fn world() -> CombatWorld {
        let mut world = CombatWorld::new();
        world.register_status(
            StatusDefinition::new("BLESSED")
                .with_boosts("RollBonus(Attack,1d4);RollBonus(SavingThrow,1d4)"),
        );
        world.add_combatant(Combatant::new("cleric", "party", 20)).expect("add");
        world.add_combatant(Combatant::new("fighter", "party", 30)).expect("add");
        world
    }

    #[test]
    fn status_boosts_follow_status_lifetime() {
        let mut world = world();
        assert_eq!(
            world.apply_status("fighter", "BLESSED", "cleric", Some(2)),
            Ok(StatusApplication::Applied)
        );
        assert_eq!(world.combatant("fighter").map(|c| c.boosts.len()), Some(2));
        world.apply_status("fighter", "BLESSED", "cleric", Some(3)).expect("refresh");
        assert_eq!(world.combatant("fighter").map(|c| c.boosts.len()), Some(2));

        assert!(world.tick_statuses("fighter").is_empty());
        assert!(world.tick_statuses("fighter").is_empty());
        assert_eq!(world.tick_statuses("fighter"), vec!["BLESSED".to_string()]);
        assert_eq!(world.combatant("fighter").map(|c| c.boosts.len()), Some(0));
    }

    #[test]
    fn immunity_prevents_application() {
        let mut world = world();
        world
            .grant_boosts("fighter", source::PASSIVE, "iron_will", "StatusImmunity(blessed)")
            .expect("grant");
        assert_eq!(
            world.apply_status("fighter", "BLESSED", "cleric", None),
            Ok(StatusApplication::Immune)
        );
        assert!(!world.has_status("fighter", "BLESSED"));
    }

    #[test]
    fn remove_on_attack_clears_hidden() {
        let mut world = world();
        world.apply_status("fighter", ids::HIDDEN, "fighter", None).expect("apply");
        world.apply_status("fighter", ids::PRONE, "fighter", None).expect("apply");
        assert_eq!(world.remove_statuses_on_attack("fighter"), vec![ids::HIDDEN.to_string()]);
        assert!(world.has_status("fighter", ids::PRONE));
    }

    #[test]
    fn unknown_combatant_is_an_error() {
        let mut world = world();
        assert_eq!(
            world.apply_status("ghost", "BLESSED", "cleric", None),
            Err(WorldError::UnknownCombatant("ghost".to_string()))
        );
        assert!(world.grant_boosts("ghost", source::PASSIVE, "x", "AC(1)").is_err());
    }

    #[test]
    fn blank_provenance_is_an_error() {
        let mut world = world();
        assert_eq!(
            world.grant_boosts("fighter", source::PASSIVE, "", "AC(1)"),
            Err(WorldError::Provenance(ProvenanceError::EmptySourceId(
                source::PASSIVE.to_string()
            )))
        );
        assert!(world.apply_status("fighter", " ", "cleric", None).is_err());
        assert!(!world.has_status("fighter", " "));
        assert_eq!(world.combatant("fighter").map(|c| c.boosts.len()), Some(0));
    }

    #[test]
    fn stunned_combatant_is_inactive() {
        let mut world = world();
        assert!(world.is_active("fighter"));
        world.apply_status("fighter", ids::STUNNED, "cleric", Some(1)).expect("apply");
        assert!(!world.is_active("fighter"));
    }
}
