//! Optional collaborators of the ability pipeline. A missing service disables the feature:
//! no height modifier, no cover, no reactions, no concentration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::boost::BoostEvaluator;
use crate::combat::combatant::Combatant;
use crate::combat::world::CombatWorld;

pub trait HeightService {
    /// Flat attack-roll modifier from relative elevation.
    fn attack_modifier(&self, attacker: &Combatant, target: &Combatant) -> i32;
}

/// +2 when the attacker stands at least `threshold` higher, -2 when that much lower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationHeightService {
    pub threshold: f32,
    pub modifier: i32,
}

impl Default for ElevationHeightService {
    fn default() -> Self {
        Self {
            threshold: 2.5,
            modifier: 2,
        }
    }
}

impl HeightService for ElevationHeightService {
    fn attack_modifier(&self, attacker: &Combatant, target: &Combatant) -> i32 {
        let delta = attacker.position.z - target.position.z;
        if delta >= self.threshold {
            self.modifier
        } else if delta <= -self.threshold {
            -self.modifier
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cover {
    #[default]
    None,
    Half,
    ThreeQuarters,
}

impl Cover {
    pub const fn ac_bonus(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Half => 2,
            Self::ThreeQuarters => 5,
        }
    }
}

pub trait LineOfSightService {
    fn has_line_of_sight(&self, _from: &Combatant, _to: &Combatant) -> bool {
        true
    }

    fn cover(&self, attacker: &Combatant, target: &Combatant) -> Cover;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionTriggerKind {
    SpellCastNearby,
    DamageTaken,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionTrigger {
    pub kind: ReactionTriggerKind,
    /// Actor whose action caused the trigger.
    pub source_id: String,
    pub ability_id: Option<String>,
    pub target_id: Option<String>,
    pub damage: Option<i32>,
    pub ability_tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionOutcome {
    pub reactor_id: String,
    pub reaction_id: String,
    /// The reaction asks to cancel the triggering action.
    pub cancel: bool,
}

pub trait ReactionResolver {
    /// Offers the trigger to candidates in order; the first one that reacts wins.
    fn offer(
        &mut self,
        trigger: &ReactionTrigger,
        candidates: &[String],
        world: &mut CombatWorld,
    ) -> Option<ReactionOutcome>;
}

/// Reacts with any candidate that has an `UnlockInterrupt(<interrupt_id>)` boost, a reaction
/// left and the resource to pay for it.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptReactionResolver {
    pub interrupt_id: String,
    pub trigger: ReactionTriggerKind,
    pub resource: Option<(String, i32)>,
    pub cancels: bool,
}

impl InterruptReactionResolver {
    /// Counterspell: spell casts nearby, paid with a third-level slot.
    pub fn counterspell() -> Self {
        Self {
            interrupt_id: "Counterspell".to_string(),
            trigger: ReactionTriggerKind::SpellCastNearby,
            resource: Some(("spell_slot_3".to_string(), 1)),
            cancels: true,
        }
    }
}

impl ReactionResolver for InterruptReactionResolver {
    fn offer(
        &mut self,
        trigger: &ReactionTrigger,
        candidates: &[String],
        world: &mut CombatWorld,
    ) -> Option<ReactionOutcome> {
        if trigger.kind != self.trigger {
            return None;
        }
        let wanted = self.interrupt_id.to_ascii_uppercase();
        let reactor_id = candidates.iter().find(|id| {
            world.is_active(id)
                && world.combatant(id).map_or(false, |c| {
                    c.budget.reactions > 0
                        && BoostEvaluator::new(&c.boosts)
                            .unlocked_interrupts()
                            .contains(&wanted)
                        && self
                            .resource
                            .as_ref()
                            .map_or(true, |(name, amount)| c.resources.current(name) >= *amount)
                })
        })?;
        let reactor = world.combatant_mut(reactor_id)?;
        reactor.budget.reactions -= 1;
        if let Some((name, amount)) = &self.resource {
            reactor
                .resources
                .consume(&std::collections::BTreeMap::from([(name.clone(), *amount)]));
        }
        Some(ReactionOutcome {
            reactor_id: reactor_id.clone(),
            reaction_id: self.interrupt_id.clone(),
            cancel: self.cancels,
        })
    }
}
