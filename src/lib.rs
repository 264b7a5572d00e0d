//! ipac-ng - embeddable IP admission control.
//!
//! Tracks connection and authentication behavior per source address,
//! escalates misbehaving addresses through warn and block states, aggregates
//! blocked IPv6 addresses into subnet groups to catch address rotation, and
//! expires stale state on a timer while an [`Enforcer`] mirrors blocks into
//! the OS packet filter.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ipac_ng::{AuthEvent, Engine, EngineConfig, IptablesEnforcer};
//!
//! # async fn run() -> Result<(), ipac_ng::IpacError> {
//! let engine = Engine::start(
//!     EngineConfig::default(),
//!     Arc::new(IptablesEnforcer::default()),
//!     None,
//! )?;
//!
//! let peer = "203.0.113.7".parse().unwrap();
//! if !engine.test_address_allowed(peer) {
//!     // drop the connection
//! }
//! engine.apply_auth_event(AuthEvent::InvalidLogin, peer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod enforcement;
pub mod engine;
pub mod error;
pub mod metrics;

pub use config::{Config, ConfigError, EnforcementBackend, EnforcementConfig, EngineConfig};
pub use enforcement::{
    EnforcementAction, Enforcer, IptablesEnforcer, NoopEnforcer, RecordingEnforcer,
};
pub use engine::{
    AddressRecord, AggregateCounts, AuthEvent, ChannelNotifier, CleanupReport, Engine,
    EngineStats, Notification, NotificationKind, Notifier, SubnetGroup,
};
pub use error::{IpacError, IpacResult};
