//! Authored data: ability, status and scenario files plus their validation.

pub mod loader;
pub mod scenario;
pub mod validate;

use std::path::Path;

pub use loader::{
    load_abilities, load_ability_dir, load_statuses, parse_abilities, parse_statuses,
    ABILITY_FILE_SUFFIX,
};
pub use scenario::{
    run_scenario, CombatantSpec, PassiveSpec, Scenario, ScenarioOutcome, ScenarioServices,
    ScenarioStep,
};
pub use validate::{
    validate_abilities, validate_ability_file, validate_scenario, validate_statuses,
    ValidationDiagnostic, ValidationReport, ValidationSeverity,
};

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("unable to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse yaml '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unable to parse json '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

pub(crate) fn read_text(path: &Path) -> Result<String, DataError> {
    std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("json"))
}
