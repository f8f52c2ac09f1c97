//! Effect kinds, the handler seam and the registry that maps one to the other.
//!
//! Effect definitions name their type with a free string. Known names map to
//! [EffectKind]; anything else is logged and skipped so data can run ahead of the code.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::ability::definition::{AbilityDefinition, EffectCondition, EffectDefinition};
use crate::ability::handlers;
use crate::boost::ConditionEvaluator;
use crate::combat::combatant::Combatant;
use crate::combat::rng::Rng;
use crate::combat::roll::{AttackRollResult, SaveRollResult};
use crate::combat::world::CombatWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EffectKind {
    Damage,
    Heal,
    ApplyStatus,
    RemoveStatus,
    TemporaryHp,
    RestoreResource,
}

impl EffectKind {
    pub const ALL: [EffectKind; 6] = [
        Self::Damage,
        Self::Heal,
        Self::ApplyStatus,
        Self::RemoveStatus,
        Self::TemporaryHp,
        Self::RestoreResource,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "damage" => Some(Self::Damage),
            "heal" | "healing" => Some(Self::Heal),
            "apply_status" => Some(Self::ApplyStatus),
            "remove_status" => Some(Self::RemoveStatus),
            "temporary_hp" | "temp_hp" => Some(Self::TemporaryHp),
            "restore_resource" => Some(Self::RestoreResource),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Damage => "damage",
            Self::Heal => "heal",
            Self::ApplyStatus => "apply_status",
            Self::RemoveStatus => "remove_status",
            Self::TemporaryHp => "temporary_hp",
            Self::RestoreResource => "restore_resource",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectResult {
    pub effect_type: String,
    pub target_id: String,
    pub success: bool,
    pub value: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EffectResult {
    pub fn new(kind: EffectKind, target_id: &str, value: i32) -> Self {
        Self {
            effect_type: kind.as_str().to_string(),
            target_id: target_id.to_string(),
            success: true,
            value,
            damage_type: None,
            status_id: None,
            message: None,
        }
    }

    pub fn failed(kind: EffectKind, target_id: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::new(kind, target_id, 0)
        }
    }
}

/// Damage dealt during effect execution, drained by the pipeline afterwards for
/// concentration checks and damage reactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DamageEvent {
    pub source_id: String,
    pub target_id: String,
    pub amount: i32,
    pub damage_type: String,
}

/// What `BeforeDamage` providers decided for one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DamageAdjustment {
    /// Added to the rolled damage before reductions and resistances.
    pub modifier: i32,
    pub prevented: bool,
}

/// Everything a handler may read or change during one execution.
pub struct EffectContext<'a> {
    pub source_id: &'a str,
    pub targets: &'a [String],
    pub ability: &'a AbilityDefinition,
    pub world: &'a mut CombatWorld,
    pub rng: &'a mut Rng,
    pub conditions: &'a dyn ConditionEvaluator,
    pub attacks: &'a BTreeMap<String, AttackRollResult>,
    /// Set when a rule window cancelled the attack roll; treated as a miss.
    pub attack_cancelled: bool,
    pub saves: &'a BTreeMap<String, SaveRollResult>,
    pub damage_adjustments: &'a BTreeMap<String, DamageAdjustment>,
    pub damage_events: Vec<DamageEvent>,
}

impl EffectContext<'_> {
    pub fn source(&self) -> Option<&Combatant> {
        self.world.combatant(self.source_id)
    }

    fn attack_rolled(&self) -> bool {
        self.ability.attack_type.is_some() && !self.targets.is_empty()
    }

    pub fn is_hit(&self, target_id: &str) -> bool {
        if !self.attack_rolled() {
            return true;
        }
        !self.attack_cancelled && self.attacks.get(target_id).map_or(false, |a| a.hit)
    }

    pub fn is_critical(&self, target_id: &str) -> bool {
        !self.attack_cancelled && self.attacks.get(target_id).map_or(false, |a| a.critical)
    }

    pub fn damage_adjustment(&self, target_id: &str) -> DamageAdjustment {
        self.damage_adjustments
            .get(target_id)
            .copied()
            .unwrap_or_default()
    }

    /// `Some(success)` when the target rolled a save in this execution.
    pub fn saved(&self, target_id: &str) -> Option<bool> {
        self.saves.get(target_id).map(|s| s.success)
    }

    /// Whether the effect's condition admits this target. `save_half` effects still reach
    /// targets that saved.
    pub fn applies_to(&self, effect: &EffectDefinition, target_id: &str) -> bool {
        let Some(condition) = effect.condition else {
            return true;
        };
        match condition {
            EffectCondition::OnHit => self.is_hit(target_id),
            EffectCondition::OnMiss => self.attack_rolled() && !self.is_hit(target_id),
            EffectCondition::OnCrit => self.is_critical(target_id),
            EffectCondition::OnSaveFail => match self.saved(target_id) {
                Some(true) => effect.save_half,
                _ => true,
            },
            EffectCondition::OnSaveSuccess => self.saved(target_id) == Some(true),
        }
    }

    pub fn applicable_targets(&self, effect: &EffectDefinition) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| self.applies_to(effect, t))
            .cloned()
            .collect()
    }
}

/// Read-only facts for previews. No dice are rolled.
pub struct PreviewContext<'a> {
    pub source: Option<&'a Combatant>,
    pub ability: &'a AbilityDefinition,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectPreview {
    pub min: i32,
    pub max: i32,
    pub average: f64,
}

impl EffectPreview {
    pub fn merge(self, other: EffectPreview) -> EffectPreview {
        EffectPreview {
            min: self.min + other.min,
            max: self.max + other.max,
            average: self.average + other.average,
        }
    }
}

pub trait EffectHandler {
    fn execute(
        &self,
        effect: &EffectDefinition,
        context: &mut EffectContext<'_>,
    ) -> Vec<EffectResult>;

    fn preview(
        &self,
        _effect: &EffectDefinition,
        _context: &PreviewContext<'_>,
    ) -> Option<EffectPreview> {
        None
    }
}

pub struct EffectRegistry {
    handlers: HashMap<EffectKind, Box<dyn EffectHandler>>,
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_builtin_handlers()
    }
}

impl EffectRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::empty();
        registry.register(EffectKind::Damage, Box::new(handlers::DamageHandler));
        registry.register(EffectKind::Heal, Box::new(handlers::HealHandler));
        registry.register(EffectKind::ApplyStatus, Box::new(handlers::ApplyStatusHandler));
        registry.register(EffectKind::RemoveStatus, Box::new(handlers::RemoveStatusHandler));
        registry.register(EffectKind::TemporaryHp, Box::new(handlers::TemporaryHpHandler));
        registry.register(
            EffectKind::RestoreResource,
            Box::new(handlers::RestoreResourceHandler),
        );
        registry
    }

    /// Replaces any handler already registered for the kind.
    pub fn register(&mut self, kind: EffectKind, handler: Box<dyn EffectHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn is_registered(&self, effect_type: &str) -> bool {
        EffectKind::from_tag(effect_type).map_or(false, |k| self.handlers.contains_key(&k))
    }

    fn handler_for(&self, effect: &EffectDefinition) -> Option<&dyn EffectHandler> {
        let Some(kind) = EffectKind::from_tag(&effect.effect_type) else {
            warn!(effect_type = %effect.effect_type, "unknown effect type skipped");
            return None;
        };
        let handler = self.handlers.get(&kind).map(|h| &**h);
        if handler.is_none() {
            warn!(effect_type = kind.as_str(), "no handler registered; effect skipped");
        }
        handler
    }

    pub fn execute(
        &self,
        effect: &EffectDefinition,
        context: &mut EffectContext<'_>,
    ) -> Vec<EffectResult> {
        match self.handler_for(effect) {
            Some(handler) => handler.execute(effect, context),
            None => Vec::new(),
        }
    }

    pub fn preview(
        &self,
        effect: &EffectDefinition,
        context: &PreviewContext<'_>,
    ) -> Option<EffectPreview> {
        self.handler_for(effect)?.preview(effect, context)
    }
}
