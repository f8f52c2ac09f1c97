//! Per-turn action economy and named resource pools.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ability::AbilityCost;

pub const DEFAULT_MOVEMENT: f32 = 9.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBudget {
    pub actions: u32,
    pub bonus_actions: u32,
    pub reactions: u32,
    pub movement: f32,
    pub max_movement: f32,
}

impl Default for ActionBudget {
    fn default() -> Self {
        Self::with_movement(DEFAULT_MOVEMENT)
    }
}

impl ActionBudget {
    pub fn with_movement(max_movement: f32) -> Self {
        Self {
            actions: 1,
            bonus_actions: 1,
            reactions: 1,
            movement: max_movement,
            max_movement,
        }
    }

    /// Restores action and bonus action plus full movement. Reactions refresh here too.
    pub fn reset_for_turn(&mut self) {
        self.actions = 1;
        self.bonus_actions = 1;
        self.reactions = 1;
        self.movement = self.max_movement;
    }

    pub fn can_pay(&self, cost: &AbilityCost) -> Result<(), String> {
        if cost.uses_action && self.actions == 0 {
            return Err("No action available".to_string());
        }
        if cost.uses_bonus_action && self.bonus_actions == 0 {
            return Err("No bonus action available".to_string());
        }
        if cost.uses_reaction && self.reactions == 0 {
            return Err("No reaction available".to_string());
        }
        if cost.movement_cost > 0.0 && self.movement + f32::EPSILON < cost.movement_cost {
            return Err(format!(
                "Insufficient movement ({:.1} < {:.1})",
                self.movement, cost.movement_cost
            ));
        }
        Ok(())
    }

    /// Deducts the cost. Callers check [ActionBudget::can_pay] first; amounts saturate at zero.
    pub fn consume(&mut self, cost: &AbilityCost) {
        if cost.uses_action {
            self.actions = self.actions.saturating_sub(1);
        }
        if cost.uses_bonus_action {
            self.bonus_actions = self.bonus_actions.saturating_sub(1);
        }
        if cost.uses_reaction {
            self.reactions = self.reactions.saturating_sub(1);
        }
        if cost.movement_cost > 0.0 {
            self.movement = (self.movement - cost.movement_cost).max(0.0);
        }
    }

    /// Action-economy flags a cost touches, as named in status `blocked_actions`.
    pub fn economy_flags(cost: &AbilityCost) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if cost.uses_action {
            flags.push("action");
        }
        if cost.uses_bonus_action {
            flags.push("bonus_action");
        }
        if cost.uses_reaction {
            flags.push("reaction");
        }
        if cost.movement_cost > 0.0 {
            flags.push("movement");
        }
        flags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub current: i32,
    pub max: i32,
}

/// Named resources (`spell_slot_1`, `ki_points`, ...). Keys are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePool {
    resources: BTreeMap<String, ResourceState>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, current: i32, max: i32) {
        self.resources.insert(
            name.into(),
            ResourceState {
                current: current.clamp(0, max.max(0)),
                max: max.max(0),
            },
        );
    }

    pub fn with(mut self, name: impl Into<String>, amount: i32) -> Self {
        self.set(name, amount, amount);
        self
    }

    pub fn current(&self, name: &str) -> i32 {
        self.resources.get(name).map_or(0, |r| r.current)
    }

    pub fn state(&self, name: &str) -> Option<ResourceState> {
        self.resources.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResourceState)> {
        self.resources.iter()
    }

    pub fn can_pay(&self, costs: &BTreeMap<String, i32>) -> Result<(), String> {
        for (name, amount) in costs {
            if *amount <= 0 {
                continue;
            }
            let available = self.current(name);
            if available < *amount {
                return Err(format!("Insufficient {name} ({available} < {amount})"));
            }
        }
        Ok(())
    }

    pub fn consume(&mut self, costs: &BTreeMap<String, i32>) {
        for (name, amount) in costs {
            if let Some(state) = self.resources.get_mut(name) {
                state.current = (state.current - (*amount).max(0)).max(0);
            }
        }
    }

    /// Adds up to max. Unknown resources are ignored. Returns the amount actually restored.
    pub fn restore(&mut self, name: &str, amount: i32) -> i32 {
        let Some(state) = self.resources.get_mut(name) else {
            return 0;
        };
        let before = state.current;
        state.current = (state.current + amount.max(0)).min(state.max);
        state.current - before
    }

    pub fn restore_all(&mut self) {
        for state in self.resources.values_mut() {
            state.current = state.max;
        }
    }
}
