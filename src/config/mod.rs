//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: The file root ([`Config`]), loading and [`ConfigError`]
//! - [`engine`]: Admission thresholds and intervals ([`EngineConfig`])
//! - [`enforcement`]: Firewall backend selection ([`EnforcementConfig`])
//! - [`validation`]: Startup checks that collect every problem at once

mod defaults;
mod engine;
mod enforcement;
mod types;
mod validation;

pub use engine::EngineConfig;
pub use enforcement::{EnforcementBackend, EnforcementConfig};
pub use types::{Config, ConfigError};
pub use validation::{ValidationError, validate, validate_engine};
