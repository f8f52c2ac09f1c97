//! Engine settings: YAML file plus `QDND_*` environment overrides.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "qdnd.yaml";
pub const SEED_ENV: &str = "QDND_SEED";
pub const LOG_ENV: &str = "QDND_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid {name} value '{value}'")]
    Env { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub seed: u64,
    /// Hostiles closer than this threaten ranged attackers.
    pub melee_range: f32,
    /// Who may react to a spell cast.
    pub reaction_range: f32,
    pub critical_threshold: u32,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            melee_range: 1.5,
            reaction_range: 18.0,
            critical_threshold: 20,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Reads `path` (missing file means defaults), then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
                path: path.display().to_string(),
                source,
            })?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// `lookup` stands in for `std::env::var` so overrides are testable.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(SEED_ENV) {
            self.seed = raw.trim().parse().map_err(|_| ConfigError::Env {
                name: SEED_ENV,
                value: raw.clone(),
            })?;
        }
        if let Some(filter) = lookup(LOG_ENV).filter(|f| !f.trim().is_empty()) {
            self.log_filter = filter;
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
