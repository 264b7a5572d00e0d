//! Unified error handling for ipac-ng.
//!
//! Only misuse of the API surfaces as an error. Enforcement failures are
//! logged by the enforcer and never reach the caller, and writes suppressed
//! by a pending purge are silent.

use crate::config::ValidationError;
use thiserror::Error;

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum IpacError {
    /// An auth event other than `logout`, `invalid_login` or `valid_login`.
    #[error("invalid auth event '{0}': expected logout, invalid_login or valid_login")]
    InvalidAuthEvent(String),

    #[error("invalid engine configuration: {}", join_errors(.0))]
    InvalidEngineConfig(Vec<ValidationError>),

    /// The engine spawns background tasks and must start inside a runtime.
    #[error("engine must be started from within a tokio runtime")]
    NoRuntime,
}

impl IpacError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAuthEvent(_) => "invalid_auth_event",
            Self::InvalidEngineConfig(_) => "invalid_engine_config",
            Self::NoRuntime => "no_runtime",
        }
    }
}

/// Result type for engine operations.
pub type IpacResult<T> = Result<T, IpacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            IpacError::InvalidAuthEvent("login".into()).error_code(),
            "invalid_auth_event"
        );
        assert_eq!(IpacError::NoRuntime.error_code(), "no_runtime");
    }

    #[test]
    fn test_invalid_auth_event_message_names_the_value() {
        let err = IpacError::InvalidAuthEvent("sudo".into());
        assert!(err.to_string().contains("'sudo'"));
    }

    #[test]
    fn test_engine_config_errors_are_joined() {
        let err = IpacError::InvalidEngineConfig(vec![
            ValidationError::InvalidGroupDepth(0),
            ValidationError::InvalidBreachFactor(1),
        ]);
        let text = err.to_string();
        assert!(text.contains("ipv6_subnet_group_depth"));
        assert!(text.contains("; "));
    }
}
