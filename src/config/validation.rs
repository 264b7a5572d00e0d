//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{Config, EngineConfig};
use thiserror::Error;

/// Longest chain name iptables accepts.
const MAX_CHAIN_LEN: usize = 28;

/// Validation errors for configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("engine.ipv6_subnet_group_depth must be between 1 and 7, got {0}")]
    InvalidGroupDepth(u32),
    #[error("engine.ipv6_subnet_breach_factor must be at least 2, got {0}")]
    InvalidBreachFactor(u64),
    #[error("enforcement.chain is required")]
    MissingChain,
    #[error("enforcement.chain must be at most 28 characters, got {0}")]
    ChainTooLong(usize),
    #[error("enforcement.chain may only contain [A-Za-z0-9_-], got '{0}'")]
    InvalidChain(String),
}

/// Validate normalized engine options.
pub fn validate_engine(engine: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_engine(engine, &mut errors);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_engine(engine: &EngineConfig, errors: &mut Vec<ValidationError>) {
    // Prefix lengths run from 8 - depth to 7 groups.
    if !(1..=7).contains(&engine.ipv6_subnet_group_depth) {
        errors.push(ValidationError::InvalidGroupDepth(
            engine.ipv6_subnet_group_depth,
        ));
    }
    if engine.ipv6_subnet_breach_factor < 2 {
        errors.push(ValidationError::InvalidBreachFactor(
            engine.ipv6_subnet_breach_factor,
        ));
    }
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_engine(&config.engine, &mut errors);

    let chain = &config.enforcement.chain;
    if chain.is_empty() {
        errors.push(ValidationError::MissingChain);
    } else if chain.len() > MAX_CHAIN_LEN {
        errors.push(ValidationError::ChainTooLong(chain.len()));
    } else if !chain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push(ValidationError::InvalidChain(chain.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
