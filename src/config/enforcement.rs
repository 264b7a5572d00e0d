//! Firewall enforcement backend configuration.

use serde::Deserialize;

use super::defaults::default_chain;

/// Which enforcer the daemon wires into the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementBackend {
    /// Manage a dedicated chain with `iptables`/`ip6tables`.
    #[default]
    Iptables,
    /// Track state in memory only.
    None,
}

/// Firewall enforcement configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnforcementConfig {
    /// Backend used to apply blocks (default: iptables).
    #[serde(default)]
    pub backend: EnforcementBackend,
    /// Name of the chain owned by this engine (default: "ipac").
    /// Flushed and recreated at startup.
    #[serde(default = "default_chain")]
    pub chain: String,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            backend: EnforcementBackend::default(),
            chain: default_chain(),
        }
    }
}
