//! Default value functions for configuration.
//!
//! Shared by the serde `default = "..."` attributes and by
//! [`EngineConfig::normalized`](super::EngineConfig::normalized), which maps
//! zero values back onto these.

// =============================================================================
// Cleanup Defaults
// =============================================================================

pub fn default_cleanup_interval_seconds() -> u64 {
    60
}

pub fn default_block_duration_seconds() -> u64 {
    60 * 60
}

// =============================================================================
// IPv6 Subnet Defaults
// =============================================================================

pub fn default_ipv6_subnet_group_depth() -> u32 {
    4
}

pub fn default_ipv6_subnet_breach_factor() -> u64 {
    40
}

// =============================================================================
// Threshold Defaults
// =============================================================================

pub fn default_warn_after_new_connections() -> u64 {
    80
}

pub fn default_warn_after_unauthed_attempts() -> u64 {
    5
}

pub fn default_block_after_new_connections() -> u64 {
    600
}

pub fn default_block_after_unauthed_attempts() -> u64 {
    30
}

pub fn default_notify_after_absurd_auth_attempts() -> u64 {
    20
}

// =============================================================================
// Enforcement Defaults
// =============================================================================

pub fn default_chain() -> String {
    "ipac".to_string()
}
