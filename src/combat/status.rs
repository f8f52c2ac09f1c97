//! Status definitions and active status instances.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::boost::{parse_boosts, BoostDefinition};

/// Read-only status lookups used by condition evaluation and the pipeline.
pub trait StatusQuery {
    fn has_status(&self, actor_id: &str, status_id: &str) -> bool;
    fn status_ids(&self, actor_id: &str) -> Vec<String>;
}

/// Status mutation the pipeline performs during an attack.
pub trait StatusService: StatusQuery {
    /// Removes every status flagged `remove_on_attack` from the attacker. Returns their ids.
    fn remove_statuses_on_attack(&mut self, actor_id: &str) -> Vec<String>;
}

/// Well-known status ids the attack resolver reads.
pub mod ids {
    pub const PRONE: &str = "PRONE";
    pub const BLINDED: &str = "BLINDED";
    pub const INVISIBLE: &str = "INVISIBLE";
    pub const STUNNED: &str = "STUNNED";
    pub const RESTRAINED: &str = "RESTRAINED";
    pub const DODGING: &str = "DODGING";
    pub const PARALYZED: &str = "PARALYZED";
    pub const ASLEEP: &str = "ASLEEP";
    pub const UNCONSCIOUS: &str = "UNCONSCIOUS";
    pub const RECKLESS: &str = "RECKLESS";
    pub const HIDDEN: &str = "HIDDEN";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub id: String,
    /// Boost DSL granted to the bearer while the status is active.
    #[serde(default)]
    pub boosts: String,
    /// Ability ids, `*`, or action-economy flags
    /// (`action`, `bonus_action`, `reaction`, `movement`).
    #[serde(default)]
    pub blocked_actions: Vec<String>,
    #[serde(default)]
    pub remove_on_attack: bool,
    #[serde(default)]
    pub incapacitating: bool,
    #[serde(default)]
    pub default_duration: Option<u32>,
}

impl StatusDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_boosts(mut self, boosts: impl Into<String>) -> Self {
        self.boosts = boosts.into();
        self
    }

    pub fn blocking(mut self, actions: &[&str]) -> Self {
        self.blocked_actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn incapacitating(mut self) -> Self {
        self.incapacitating = true;
        self
    }

    pub fn removed_on_attack(mut self) -> Self {
        self.remove_on_attack = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStatus {
    pub status_id: String,
    pub target_id: String,
    pub source_id: String,
    /// `None` lasts until removed.
    pub remaining_turns: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusApplication {
    Applied,
    Refreshed,
    Immune,
}

fn key(status_id: &str) -> String {
    status_id.trim().to_ascii_uppercase()
}

/// Registry of status definitions plus the active instances, keyed by target id.
#[derive(Debug, Clone, Default)]
pub struct StatusManager {
    definitions: BTreeMap<String, StatusDefinition>,
    parsed_boosts: BTreeMap<String, Vec<BoostDefinition>>,
    active: Vec<ActiveStatus>,
}

impl StatusManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the conditions the attack and save resolvers rely on.
    pub fn with_core_conditions() -> Self {
        let mut manager = Self::new();
        for definition in [
            StatusDefinition::new(ids::PRONE),
            StatusDefinition::new(ids::BLINDED),
            StatusDefinition::new(ids::INVISIBLE),
            StatusDefinition::new(ids::RESTRAINED).blocking(&["movement"]),
            StatusDefinition::new(ids::DODGING),
            StatusDefinition::new(ids::RECKLESS),
            StatusDefinition::new(ids::HIDDEN).removed_on_attack(),
            StatusDefinition::new(ids::STUNNED).incapacitating(),
            StatusDefinition::new(ids::PARALYZED).incapacitating(),
            StatusDefinition::new(ids::ASLEEP).incapacitating(),
            StatusDefinition::new(ids::UNCONSCIOUS).incapacitating(),
        ] {
            manager.register(definition);
        }
        manager
    }

    pub fn register(&mut self, definition: StatusDefinition) {
        let id = key(&definition.id);
        self.parsed_boosts
            .insert(id.clone(), parse_boosts(&definition.boosts));
        self.definitions.insert(id, definition);
    }

    pub fn definition(&self, status_id: &str) -> Option<&StatusDefinition> {
        self.definitions.get(&key(status_id))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &StatusDefinition> {
        self.definitions.values()
    }

    /// Parsed boosts of a registered status; empty for unknown ids.
    pub fn boosts_for(&self, status_id: &str) -> &[BoostDefinition] {
        self.parsed_boosts
            .get(&key(status_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_active(&self, actor_id: &str, status_id: &str) -> bool {
        self.active
            .iter()
            .any(|s| s.target_id == actor_id && s.status_id.eq_ignore_ascii_case(status_id))
    }

    pub fn active_for(&self, actor_id: &str) -> Vec<&ActiveStatus> {
        self.active
            .iter()
            .filter(|s| s.target_id == actor_id)
            .collect()
    }

    pub fn all_active(&self) -> &[ActiveStatus] {
        &self.active
    }

    /// Inserts an instance, or extends an existing one to the longer duration.
    pub fn insert(&mut self, status: ActiveStatus) -> StatusApplication {
        if let Some(existing) = self.active.iter_mut().find(|s| {
            s.target_id == status.target_id && s.status_id.eq_ignore_ascii_case(&status.status_id)
        }) {
            existing.remaining_turns = match (existing.remaining_turns, status.remaining_turns) {
                (None, _) | (_, None) => None,
                (Some(a), Some(b)) => Some(a.max(b)),
            };
            existing.source_id = status.source_id;
            return StatusApplication::Refreshed;
        }
        self.active.push(status);
        StatusApplication::Applied
    }

    pub fn remove(&mut self, actor_id: &str, status_id: &str) -> Option<ActiveStatus> {
        let index = self
            .active
            .iter()
            .position(|s| s.target_id == actor_id && s.status_id.eq_ignore_ascii_case(status_id))?;
        Some(self.active.remove(index))
    }

    /// Decrements timed statuses on the actor and removes those reaching zero.
    pub fn tick(&mut self, actor_id: &str) -> Vec<ActiveStatus> {
        let mut expired = Vec::new();
        self.active.retain_mut(|status| {
            if status.target_id != actor_id {
                return true;
            }
            match status.remaining_turns.as_mut() {
                Some(turns) => {
                    *turns = turns.saturating_sub(1);
                    if *turns == 0 {
                        expired.push(status.clone());
                        false
                    } else {
                        true
                    }
                }
                None => true,
            }
        });
        expired
    }

    pub fn is_incapacitated(&self, actor_id: &str) -> bool {
        self.active_for(actor_id).iter().any(|s| {
            self.definition(&s.status_id)
                .map_or(false, |d| d.incapacitating)
        })
    }

    /// First active status blocking the ability id, `*`, or one of the given economy flags.
    pub fn blocking_status(
        &self,
        actor_id: &str,
        ability_id: &str,
        economy_flags: &[&str],
    ) -> Option<String> {
        self.active_for(actor_id).into_iter().find_map(|s| {
            let definition = self.definition(&s.status_id)?;
            let blocks = definition.blocked_actions.iter().any(|blocked| {
                blocked == "*"
                    || blocked.eq_ignore_ascii_case(ability_id)
                    || economy_flags.iter().any(|f| blocked.eq_ignore_ascii_case(f))
            });
            blocks.then(|| s.status_id.clone())
        })
    }

    pub fn remove_on_attack_ids(&self, actor_id: &str) -> Vec<String> {
        self.active_for(actor_id)
            .into_iter()
            .filter(|s| {
                self.definition(&s.status_id)
                    .map_or(false, |d| d.remove_on_attack)
            })
            .map(|s| s.status_id.clone())
            .collect()
    }

    pub fn clear(&mut self) -> Vec<ActiveStatus> {
        std::mem::take(&mut self.active)
    }
}

impl StatusQuery for StatusManager {
    fn has_status(&self, actor_id: &str, status_id: &str) -> bool {
        self.is_active(actor_id, status_id)
    }

    fn status_ids(&self, actor_id: &str) -> Vec<String> {
        self.active_for(actor_id)
            .into_iter()
            .map(|s| s.status_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(status_id: &str, target: &str, turns: Option<u32>) -> ActiveStatus {
        ActiveStatus {
            status_id: status_id.to_string(),
            target_id: target.to_string(),
            source_id: "caster".to_string(),
            remaining_turns: turns,
        }
    }

    #[test]
    fn insert_refreshes_to_longer_duration() {
        let mut manager = StatusManager::new();
        assert_eq!(manager.insert(active("BLESSED", "a", Some(2))), StatusApplication::Applied);
        assert_eq!(manager.insert(active("blessed", "a", Some(5))), StatusApplication::Refreshed);
        assert_eq!(manager.active_for("a")[0].remaining_turns, Some(5));
    }

    #[test]
    fn tick_expires_only_that_actor() {
        let mut manager = StatusManager::new();
        manager.insert(active("BURNING", "a", Some(1)));
        manager.insert(active("BURNING", "b", Some(1)));
        manager.insert(active("RAGE", "a", None));
        let expired = manager.tick("a");
        assert_eq!(expired.len(), 1);
        assert!(manager.is_active("b", "BURNING"));
        assert!(manager.is_active("a", "RAGE"));
    }

    #[test]
    fn blocking_matches_wildcard_ids_and_flags() {
        let mut manager = StatusManager::with_core_conditions();
        manager.register(StatusDefinition::new("SILENCED").blocking(&["fire_bolt"]));
        manager.register(StatusDefinition::new("DAZED").blocking(&["reaction"]));
        manager.insert(active("SILENCED", "a", None));
        manager.insert(active("DAZED", "b", None));
        let blocker = manager.blocking_status("a", "fire_bolt", &["action"]);
        assert_eq!(blocker.as_deref(), Some("SILENCED"));
        assert_eq!(manager.blocking_status("a", "shove", &["action"]), None);
        assert_eq!(manager.blocking_status("b", "shield", &["reaction"]).as_deref(), Some("DAZED"));
    }

    #[test]
    fn core_conditions_flag_incapacitation() {
        let mut manager = StatusManager::with_core_conditions();
        manager.insert(active(ids::STUNNED, "a", Some(1)));
        assert!(manager.is_incapacitated("a"));
        assert!(!manager.is_incapacitated("b"));
    }
}
