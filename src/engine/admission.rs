//! Admission evaluation: the per-connection warn/block state machine.
//!
//! ```text
//!                 unauthed conns >= warn_after_new_connections
//!                 or invalid logins >= warn_after_unauthed_attempts
//!   ┌────────┐  ──────────────────────────────────────────────▶  ┌────────┐
//!   │ normal │                                                   │ warned │
//!   └────────┘                                                   └────────┘
//!        │ unauthed conns >= block_after_new_connections             │
//!        │ or invalid logins >= block_after_unauthed_attempts        │
//!        ▼                                                           ▼
//!   ┌─────────┐  valid_login clears warn and blocked; expiry drops the record
//!   │ blocked │
//!   └─────────┘
//! ```
//!
//! Transitions are only evaluated for unauthenticated addresses. An
//! authenticated address keeps its counters but is judged on absurd-auth
//! attempts instead.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use tracing::{debug, info};

use super::state::{Effects, EngineState};
use crate::enforcement::EnforcementAction;
use crate::metrics;

impl EngineState {
    /// Count one inbound connection from `addr` and decide whether to admit it.
    pub(crate) fn test_address_allowed(
        &mut self,
        addr: IpAddr,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) -> bool {
        if self.config.never_block {
            return true;
        }

        if self.purge_pending {
            return self.records.get(&addr).is_none_or(|r| !r.blocked);
        }

        let cfg = &self.config;
        let record = self.records.get_or_create(addr, now);
        record.last_access_at = Some(now);

        if !record.authenticated {
            record.unauthed_new_connections += 1;

            if !record.warn
                && (record.unauthed_new_connections >= cfg.warn_after_new_connections
                    || record.unauthed_attempts >= cfg.warn_after_unauthed_attempts)
            {
                record.warn = true;
                debug!(
                    %addr,
                    connections = record.unauthed_new_connections,
                    attempts = record.unauthed_attempts,
                    "address warned"
                );
            }
        }

        let should_block = !record.authenticated
            && !record.blocked
            && (record.unauthed_new_connections >= cfg.block_after_new_connections
                || record.unauthed_attempts >= cfg.block_after_unauthed_attempts);

        if should_block {
            record.blocked = true;
            effects.enforce(EnforcementAction::BlockAddress(addr));
            self.batcher.push_blocked(addr.to_string());
            metrics::record_address_blocked();
            info!(
                %addr,
                connections = record.unauthed_new_connections,
                attempts = record.unauthed_attempts,
                "address blocked"
            );

            if let IpAddr::V6(v6) = addr {
                self.subnets.record_ban(&v6, now, effects);
            }
        } else if record.absurd_auth_attempts >= cfg.notify_after_absurd_auth_attempts {
            self.batcher.push_absurd(addr.to_string());
        }

        let allowed = !record.blocked;
        if !allowed {
            metrics::record_admission_denied();
        }
        allowed
    }

    /// Whether `addr` is currently warned. Never mutates state.
    pub(crate) fn test_address_warn(&self, addr: &IpAddr) -> bool {
        self.records.get(addr).is_some_and(|r| r.warn)
    }
}
