pub mod budget;
pub mod combatant;
pub mod concentration;
pub mod dice;
pub mod rng;
pub mod roll;
pub mod services;
pub mod status;
pub mod trace;
pub mod world;

pub use budget::{ActionBudget, ResourcePool, ResourceState};
pub use combatant::{score_modifier, AbilityScores, Combatant, Position, Weapon};
pub use concentration::{
    concentration_dc, Concentration, ConcentrationCheck, ConcentrationLedger,
    ConcentrationTracker,
};
pub use dice::{combine_formula_strings, DiceFormula, DiceParseError};
pub use rng::Rng;
pub use roll::{
    resolve_attack, resolve_save, AttackQuery, AttackRollResult, D20RollService, RollMode,
    RollService, SaveQuery, SaveRollResult,
};
pub use services::{
    Cover, ElevationHeightService, HeightService, InterruptReactionResolver, LineOfSightService,
    ReactionOutcome, ReactionResolver, ReactionTrigger, ReactionTriggerKind,
};
pub use status::{
    ActiveStatus, StatusApplication, StatusDefinition, StatusManager, StatusQuery, StatusService,
};
pub use trace::{serialize_events_json, CombatEvent, EventSource, TraceCollector};
pub use world::{CombatWorld, WorldError};
