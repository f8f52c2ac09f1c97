use std::env;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, error};

use crate::boost::parse_boosts_with_report;
use crate::config::{EngineConfig, DEFAULT_CONFIG_PATH};
use crate::data::{
    run_scenario, validate_ability_file, validate_scenario, Scenario, ValidationSeverity,
};
use crate::logging;
use crate::parallel::{run_scenario_batch, WorkerPool};

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "QDND_CONFIG";
/// Worker threads for `batch`; 0 or unset uses every core.
pub const WORKERS_ENV: &str = "QDND_WORKERS";

const USAGE: &str = "usage: qdnd <parse|simulate|validate|batch>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Parse,
    Simulate,
    Validate,
    Batch,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("parse") => Some(Command::Parse),
        Some("simulate") => Some(Command::Simulate),
        Some("validate") => Some(Command::Validate),
        Some("batch") => Some(Command::Batch),
        _ => None,
    }
}

/// Returns the process exit code: 0 success, 1 failure, 2 usage.
pub fn run_with_args(args: &[String]) -> i32 {
    let Some(command) = parse_command(args) else {
        eprintln!("{USAGE}");
        return 2;
    };
    let config = match load_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            return 1;
        }
    };
    logging::init(&config.log_filter);
    debug!(?command, seed = config.seed, "dispatching");

    match command {
        Command::Parse => handle_parse(args),
        Command::Simulate => handle_simulate(args, &config),
        Command::Validate => handle_validate(args),
        Command::Batch => handle_batch(args, &config),
    }
}

fn load_config() -> Result<EngineConfig, String> {
    let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    EngineConfig::load(&path).map_err(|err| format!("config error: {err}"))
}

fn handle_parse(args: &[String]) -> i32 {
    let Some(input) = args.get(2) else {
        eprintln!("usage: qdnd parse \"<boost string>\"");
        return 2;
    };
    let report = parse_boosts_with_report(input);
    let code = if report.errors.is_empty() { 0 } else { 1 };
    print_json(&report, "boost parse report").max(code)
}

fn handle_simulate(args: &[String], config: &EngineConfig) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: qdnd simulate <scenario.yaml> [seed]");
        return 2;
    };
    let scenario = match load_scenario(path) {
        Ok(scenario) => scenario,
        Err(code) => return code,
    };
    let seed = parse_u64_arg(args.get(3), "seed", scenario.seed.unwrap_or(config.seed));
    match run_scenario(&scenario, &config.clone().with_seed(seed)) {
        Ok(outcome) => print_json(&outcome, "scenario outcome"),
        Err(err) => {
            eprintln!("simulation failed: {err}");
            1
        }
    }
}

fn handle_validate(args: &[String]) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: qdnd validate <abilities.yaml|scenario.yaml>");
        return 2;
    };
    let is_scenario = args.iter().skip(3).any(|arg| arg == "--scenario");
    let report = if is_scenario {
        match load_scenario(path) {
            Ok(scenario) => validate_scenario(&scenario),
            Err(code) => return code,
        }
    } else {
        match validate_ability_file(path) {
            Ok(report) => report,
            Err(err) => {
                eprintln!("validation failed: {err}");
                return 1;
            }
        }
    };

    for diagnostic in &report.diagnostics {
        eprintln!("- {diagnostic}");
    }
    if report.has_errors() {
        eprintln!(
            "validation failed: {} error(s), {} warning(s)",
            report.count(ValidationSeverity::Error),
            report.count(ValidationSeverity::Warning)
        );
        1
    } else {
        println!(
            "validation passed: {path} ({} warning(s))",
            report.count(ValidationSeverity::Warning)
        );
        0
    }
}

fn handle_batch(args: &[String], config: &EngineConfig) -> i32 {
    let (Some(path), Some(raw_runs)) = (args.get(2), args.get(3)) else {
        eprintln!("usage: qdnd batch <scenario.yaml> <runs> [seed]");
        return 2;
    };
    let Ok(runs) = raw_runs.parse::<usize>() else {
        eprintln!("invalid runs '{raw_runs}'");
        return 2;
    };
    let scenario = match load_scenario(path) {
        Ok(scenario) => scenario,
        Err(code) => return code,
    };
    let base_seed = parse_u64_arg(args.get(4), "seed", scenario.seed.unwrap_or(config.seed));
    let workers = env::var(WORKERS_ENV)
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(0);

    let pool = WorkerPool::with_workers(workers);
    match run_scenario_batch(&scenario, config, runs, base_seed, &pool) {
        Ok(summary) => print_json(&summary, "batch summary"),
        Err(err) => {
            eprintln!("batch failed: {err}");
            1
        }
    }
}

fn load_scenario(path: &str) -> Result<Scenario, i32> {
    Scenario::load(Path::new(path)).map_err(|err| {
        eprintln!("failed to load scenario: {err}");
        1
    })
}

fn print_json<T: Serialize>(value: &T, what: &str) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            error!(%err, "serialization failed");
            eprintln!("failed to serialize {what}: {err}");
            1
        }
    }
}

fn parse_u64_arg(raw: Option<&String>, name: &str, default: u64) -> u64 {
    raw.and_then(|value| value.parse::<u64>().ok())
        .unwrap_or_else(|| {
            if let Some(value) = raw {
                eprintln!("invalid {name} '{value}', defaulting to {default}");
            }
            default
        })
}
