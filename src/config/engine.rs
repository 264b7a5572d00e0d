//! Admission engine thresholds and intervals.

use serde::Deserialize;
use std::time::Duration;

use super::defaults::*;

/// Thresholds and intervals for the admission engine.
///
/// Every numeric option treats `0` the same as "unset": after
/// [`normalized`](Self::normalized) it carries its default. The engine only
/// ever sees normalized values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Seconds between cleanup ticks (default: 60).
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
    /// Lifetime of an address record or subnet block (default: 3600).
    #[serde(default = "default_block_duration_seconds")]
    pub block_duration_seconds: u64,
    /// Number of ranked IPv6 prefixes tracked per blocked address (default: 4).
    #[serde(default = "default_ipv6_subnet_group_depth")]
    pub ipv6_subnet_group_depth: u32,
    /// Base of the exponential subnet breach threshold (default: 40).
    #[serde(default = "default_ipv6_subnet_breach_factor")]
    pub ipv6_subnet_breach_factor: u64,
    /// Unauthenticated connections before an address is warned (default: 80).
    #[serde(default = "default_warn_after_new_connections")]
    pub warn_after_new_connections: u64,
    /// Invalid logins before an address is warned (default: 5).
    #[serde(default = "default_warn_after_unauthed_attempts")]
    pub warn_after_unauthed_attempts: u64,
    /// Unauthenticated connections before an address is blocked (default: 600).
    #[serde(default = "default_block_after_new_connections")]
    pub block_after_new_connections: u64,
    /// Invalid logins before an address is blocked (default: 30).
    #[serde(default = "default_block_after_unauthed_attempts")]
    pub block_after_unauthed_attempts: u64,
    /// Invalid logins against an authenticated address before the operator
    /// is notified (default: 20).
    #[serde(default = "default_notify_after_absurd_auth_attempts")]
    pub notify_after_absurd_auth_attempts: u64,
    /// Admit everything without tracking; auth events are ignored.
    #[serde(default)]
    pub never_block: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            block_duration_seconds: default_block_duration_seconds(),
            ipv6_subnet_group_depth: default_ipv6_subnet_group_depth(),
            ipv6_subnet_breach_factor: default_ipv6_subnet_breach_factor(),
            warn_after_new_connections: default_warn_after_new_connections(),
            warn_after_unauthed_attempts: default_warn_after_unauthed_attempts(),
            block_after_new_connections: default_block_after_new_connections(),
            block_after_unauthed_attempts: default_block_after_unauthed_attempts(),
            notify_after_absurd_auth_attempts: default_notify_after_absurd_auth_attempts(),
            never_block: false,
        }
    }
}

/// Replace a zero option with its default.
fn or_default<T: PartialEq + Default>(value: T, default: fn() -> T) -> T {
    if value == T::default() { default() } else { value }
}

impl EngineConfig {
    /// Return a copy with every zero option replaced by its default.
    pub fn normalized(&self) -> Self {
        Self {
            cleanup_interval_seconds: or_default(
                self.cleanup_interval_seconds,
                default_cleanup_interval_seconds,
            ),
            block_duration_seconds: or_default(
                self.block_duration_seconds,
                default_block_duration_seconds,
            ),
            ipv6_subnet_group_depth: or_default(
                self.ipv6_subnet_group_depth,
                default_ipv6_subnet_group_depth,
            ),
            ipv6_subnet_breach_factor: or_default(
                self.ipv6_subnet_breach_factor,
                default_ipv6_subnet_breach_factor,
            ),
            warn_after_new_connections: or_default(
                self.warn_after_new_connections,
                default_warn_after_new_connections,
            ),
            warn_after_unauthed_attempts: or_default(
                self.warn_after_unauthed_attempts,
                default_warn_after_unauthed_attempts,
            ),
            block_after_new_connections: or_default(
                self.block_after_new_connections,
                default_block_after_new_connections,
            ),
            block_after_unauthed_attempts: or_default(
                self.block_after_unauthed_attempts,
                default_block_after_unauthed_attempts,
            ),
            notify_after_absurd_auth_attempts: or_default(
                self.notify_after_absurd_auth_attempts,
                default_notify_after_absurd_auth_attempts,
            ),
            never_block: self.never_block,
        }
    }

    /// Period of the cleanup scheduler.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    /// Block duration as signed whole seconds, the unit cleanup ages use.
    pub fn block_duration_secs_i64(&self) -> i64 {
        i64::try_from(self.block_duration_seconds).unwrap_or(i64::MAX)
    }
}
