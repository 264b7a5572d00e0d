//! Authentication feedback from the embedding application.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::debug;

use super::state::{Effects, EngineState};
use crate::enforcement::EnforcementAction;
use crate::error::IpacError;
use crate::metrics;

/// Outcome of an authentication exchange reported by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    Logout,
    InvalidLogin,
    ValidLogin,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::InvalidLogin => "invalid_login",
            Self::ValidLogin => "valid_login",
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthEvent {
    type Err = IpacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logout" => Ok(Self::Logout),
            "invalid_login" => Ok(Self::InvalidLogin),
            "valid_login" => Ok(Self::ValidLogin),
            other => Err(IpacError::InvalidAuthEvent(other.to_string())),
        }
    }
}

impl EngineState {
    /// Apply an auth event to the record for `addr`.
    ///
    /// An invalid login against an address that is already authenticated is
    /// counted as an absurd attempt and never deauthenticates it.
    pub(crate) fn apply_auth_event(
        &mut self,
        event: AuthEvent,
        addr: IpAddr,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) {
        if self.purge_pending || self.config.never_block {
            return;
        }

        let record = self.records.get_or_create(addr, now);
        match event {
            AuthEvent::InvalidLogin if record.authenticated => {
                record.absurd_auth_attempts += 1;
            }
            AuthEvent::ValidLogin => {
                if record.blocked {
                    effects.enforce(EnforcementAction::UnblockAddress(addr));
                    debug!(%addr, "block lifted by valid login");
                }
                record.blocked = false;
                record.warn = false;
                record.authenticated = true;
            }
            AuthEvent::InvalidLogin => {
                record.unauthed_attempts += 1;
            }
            AuthEvent::Logout => {
                record.authenticated = false;
            }
        }
        record.last_auth_at = Some(now);

        metrics::record_auth_event(event.as_str());
        debug!(%addr, %event, "auth event applied");
    }
}
