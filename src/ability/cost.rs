//! Effective cost of one execution: base, then variant, then upcast.

use crate::ability::definition::{AbilityCost, AbilityDefinition, AbilityVariant};

const SLOT_PREFIX: &str = "spell_slot_";

/// Level of a `spell_slot_N` key.
pub fn slot_level(key: &str) -> Option<u32> {
    key.strip_prefix(SLOT_PREFIX)?.parse().ok()
}

pub fn slot_key(level: u32) -> String {
    format!("{SLOT_PREFIX}{level}")
}

fn add_cost(into: &mut AbilityCost, extra: &AbilityCost) {
    into.uses_action |= extra.uses_action;
    into.uses_bonus_action |= extra.uses_bonus_action;
    into.uses_reaction |= extra.uses_reaction;
    into.movement_cost += extra.movement_cost;
    for (name, amount) in &extra.resource_costs {
        *into.resource_costs.entry(name.clone()).or_insert(0) += amount;
    }
}

/// Builds the cost actually charged.
///
/// A variant's `cost_override` replaces the base cost and its `additional_cost` is added on
/// top. Upcasting moves a `spell_slot_N` entry to `spell_slot_(N + level)`; without a slot
/// key the upcast resource is charged `base_cost + level * cost_per_level`.
pub fn effective_cost(
    ability: &AbilityDefinition,
    variant: Option<&AbilityVariant>,
    upcast_level: u32,
) -> AbilityCost {
    let mut cost = variant
        .and_then(|v| v.cost_override.clone())
        .unwrap_or_else(|| ability.cost.clone());
    if let Some(extra) = variant.and_then(|v| v.additional_cost.as_ref()) {
        add_cost(&mut cost, extra);
    }
    if upcast_level == 0 {
        return cost;
    }

    let slot = cost
        .resource_costs
        .iter()
        .find_map(|(key, amount)| slot_level(key).map(|level| (key.clone(), level, *amount)));
    match slot {
        Some((key, level, amount)) => {
            cost.resource_costs.remove(&key);
            *cost
                .resource_costs
                .entry(slot_key(level + upcast_level))
                .or_insert(0) += amount;
        }
        None => {
            if let Some(scaling) = ability.upcast.as_ref().filter(|s| !s.resource_key.is_empty()) {
                let amount = scaling.base_cost + upcast_level as i32 * scaling.cost_per_level;
                cost.resource_costs
                    .insert(scaling.resource_key.clone(), amount);
            }
        }
    }
    cost
}
