//! Turn-based 5e rules core: a boost DSL for stat modifiers and an ability pipeline that
//! validates, rolls and resolves actions against a combat world.

pub mod ability;
pub mod boost;
pub mod cli;
pub mod combat;
pub mod config;
pub mod data;
pub mod logging;
pub mod parallel;
pub mod rules;
