//! Ability definitions and the execution pipeline that resolves them.

pub mod cooldown;
pub mod cost;
pub mod definition;
pub mod effects;
pub mod handlers;
pub mod pipeline;
pub mod requirements;
pub mod result;
pub mod shaping;

pub use cooldown::{AbilityCooldownState, CooldownSnapshot, CooldownTracker, DecrementType};
pub use cost::effective_cost;
pub use definition::{
    AbilityCooldown, AbilityCost, AbilityDefinition, AbilityRequirement, AbilityVariant,
    AttackType, EffectCondition, EffectDefinition, RequirementKind, TargetKind, TargetingConfig,
    UpcastScaling,
};
pub use effects::{
    DamageAdjustment, DamageEvent, EffectContext, EffectHandler, EffectKind, EffectPreview,
    EffectRegistry, EffectResult, PreviewContext,
};
pub use pipeline::{AbilityObserver, AbilityPipeline, UNCOUNTERABLE_TAG};
pub use result::{AbilityExecutionResult, ExecutionOptions, ValidationFailure};
pub use shaping::effective_effects;
