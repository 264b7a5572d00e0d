//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::engine::EngineConfig;
use super::enforcement::EnforcementConfig;
use super::validation::{ValidationError, validate};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Daemon configuration file root.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Admission thresholds and intervals.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Firewall backend.
    #[serde(default)]
    pub enforcement: EnforcementConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Zero-valued engine options are replaced by their defaults and the
    /// result is validated before it is returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.engine = config.engine.normalized();
        validate(&config).map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}
