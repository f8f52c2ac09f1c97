//! Charges and cooldowns per `(combatant, ability)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ability::definition::AbilityCooldown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecrementType {
    Turn,
    Round,
}

impl DecrementType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Turn => "turn",
            Self::Round => "round",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityCooldownState {
    pub max_charges: u32,
    pub current_charges: u32,
    pub remaining_cooldown: u32,
    pub decrement_type: DecrementType,
    pub cooldown_length: u32,
}

impl AbilityCooldownState {
    fn tick(&mut self) {
        if self.remaining_cooldown == 0 {
            return;
        }
        self.remaining_cooldown -= 1;
        if self.remaining_cooldown == 0 && self.current_charges < self.max_charges {
            self.current_charges += 1;
            if self.current_charges < self.max_charges {
                self.remaining_cooldown = self.cooldown_length;
            }
        }
    }
}

/// Flat persistence record for one cooldown entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownSnapshot {
    pub combatant_id: String,
    pub ability_id: String,
    pub max_charges: u32,
    pub current_charges: u32,
    pub remaining_cooldown: u32,
    pub decrement_type: DecrementType,
    #[serde(default)]
    pub cooldown_length: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CooldownTracker {
    states: BTreeMap<(String, String), AbilityCooldownState>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, combatant_id: &str, ability_id: &str) -> Option<&AbilityCooldownState> {
        self.states
            .get(&(combatant_id.to_string(), ability_id.to_string()))
    }

    /// No state yet means full charges.
    pub fn has_charges(&self, combatant_id: &str, ability_id: &str) -> bool {
        self.state(combatant_id, ability_id)
            .map_or(true, |s| s.current_charges > 0)
    }

    /// Spends one charge. Abilities without a cooldown are never tracked.
    pub fn consume(&mut self, combatant_id: &str, ability_id: &str, cooldown: &AbilityCooldown) {
        if !cooldown.is_defined() {
            return;
        }
        let (decrement_type, length) = if cooldown.turn_cooldown > 0 {
            (DecrementType::Turn, cooldown.turn_cooldown)
        } else {
            (DecrementType::Round, cooldown.round_cooldown)
        };
        let max_charges = cooldown.max_charges.max(1);
        let state = self
            .states
            .entry((combatant_id.to_string(), ability_id.to_string()))
            .or_insert(AbilityCooldownState {
                max_charges,
                current_charges: max_charges,
                remaining_cooldown: 0,
                decrement_type,
                cooldown_length: length,
            });
        state.current_charges = state.current_charges.saturating_sub(1);
        state.remaining_cooldown = length;
    }

    /// Ticks turn cooldowns of one combatant.
    pub fn process_turn_start(&mut self, combatant_id: &str) {
        for ((owner, _), state) in self.states.iter_mut() {
            if owner == combatant_id && state.decrement_type == DecrementType::Turn {
                state.tick();
            }
        }
    }

    /// Ticks round cooldowns of everyone.
    pub fn process_round_end(&mut self) {
        for state in self.states.values_mut() {
            if state.decrement_type == DecrementType::Round {
                state.tick();
            }
        }
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }

    pub fn export(&self) -> Vec<CooldownSnapshot> {
        self.states
            .iter()
            .map(|((combatant_id, ability_id), s)| CooldownSnapshot {
                combatant_id: combatant_id.clone(),
                ability_id: ability_id.clone(),
                max_charges: s.max_charges,
                current_charges: s.current_charges,
                remaining_cooldown: s.remaining_cooldown,
                decrement_type: s.decrement_type,
                cooldown_length: s.cooldown_length,
            })
            .collect()
    }

    /// Replaces all state with the snapshot. Charges are clamped to max.
    pub fn import(&mut self, snapshot: &[CooldownSnapshot]) {
        self.states = snapshot
            .iter()
            .map(|s| {
                let length = if s.cooldown_length == 0 {
                    s.remaining_cooldown
                } else {
                    s.cooldown_length
                };
                (
                    (s.combatant_id.clone(), s.ability_id.clone()),
                    AbilityCooldownState {
                        max_charges: s.max_charges,
                        current_charges: s.current_charges.min(s.max_charges),
                        remaining_cooldown: s.remaining_cooldown,
                        decrement_type: s.decrement_type,
                        cooldown_length: length,
                    },
                )
            })
            .collect();
    }
}
