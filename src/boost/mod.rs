//! Boost DSL: parsing, per-actor storage and evaluation of stat modifiers.

pub mod condition;
pub mod container;
pub mod evaluator;
pub mod parser;
pub mod types;

pub use condition::{
    BasicConditionEvaluator, ConditionContext, ConditionEvaluator, EvaluationContext,
};
pub use container::{BoostContainer, ProvenanceError};
pub use evaluator::{
    BoostEvaluator, BoostQuery, CriticalHitModifier, RerollRule, WeaponDamageBonus,
};
pub use parser::{parse_boosts, parse_boosts_with_report, BoostParseError, BoostParseReport};
pub use types::{
    source, AbilityScore, ActiveBoost, BoostDefinition, BoostType, BoostValue, ResistanceLevel,
    RollType,
};
