//! Prometheus metrics collection for ipac-ng.
//!
//! Metrics live in a process-wide registry so an embedding application can
//! merge them into its own exposition endpoint via [`gather_metrics`].
//!
//! - `ipac_addresses_blocked_total` - Addresses moved to the block state
//! - `ipac_subnets_blocked_total` - IPv6 subnet groups that breached
//! - `ipac_admissions_denied_total` - Admission checks answered with "deny"
//! - `ipac_auth_events_total{event}` - Auth feedback events applied
//! - `ipac_notifications_total{kind}` - Notifications handed to the notifier
//! - `ipac_tracked_addresses`, `ipac_blocked_addresses`,
//!   `ipac_warned_addresses`, `ipac_blocked_subnets` - Cleanup aggregates

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{Once, OnceLock};

use crate::engine::AggregateCounts;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

static INIT: Once = Once::new();

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Addresses moved to the block state.
pub static ADDRESSES_BLOCKED: OnceLock<IntCounter> = OnceLock::new();

/// IPv6 subnet groups blocked after breaching their threshold.
pub static SUBNETS_BLOCKED: OnceLock<IntCounter> = OnceLock::new();

/// Admission checks that returned "deny".
pub static ADMISSIONS_DENIED: OnceLock<IntCounter> = OnceLock::new();

/// Auth feedback events by kind.
pub static AUTH_EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Notifications dispatched by kind.
pub static NOTIFICATIONS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (recomputed every cleanup tick)
// ========================================================================

pub static TRACKED_ADDRESSES: OnceLock<IntGauge> = OnceLock::new();
pub static BLOCKED_ADDRESSES: OnceLock<IntGauge> = OnceLock::new();
pub static WARNED_ADDRESSES: OnceLock<IntGauge> = OnceLock::new();
pub static BLOCKED_SUBNETS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Called by [`Engine::start`](crate::Engine::start); later calls are no-ops.
/// Until it runs, every recording helper does nothing.
pub fn init() {
    INIT.call_once(|| {
        let r = registry();

        // Helper macro to register metric
        macro_rules! register {
            ($metric:ident, $init:expr) => {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            };
        }

        register!(ADDRESSES_BLOCKED, IntCounter::new("ipac_addresses_blocked_total", "Addresses moved to the block state"));
        register!(SUBNETS_BLOCKED, IntCounter::new("ipac_subnets_blocked_total", "IPv6 subnet groups blocked"));
        register!(ADMISSIONS_DENIED, IntCounter::new("ipac_admissions_denied_total", "Admission checks denied"));
        register!(AUTH_EVENTS, IntCounterVec::new(Opts::new("ipac_auth_events_total", "Auth feedback events applied"), &["event"]));
        register!(NOTIFICATIONS, IntCounterVec::new(Opts::new("ipac_notifications_total", "Notifications dispatched"), &["kind"]));
        register!(TRACKED_ADDRESSES, IntGauge::new("ipac_tracked_addresses", "Address records surviving the last cleanup"));
        register!(BLOCKED_ADDRESSES, IntGauge::new("ipac_blocked_addresses", "Blocked addresses as of the last cleanup"));
        register!(WARNED_ADDRESSES, IntGauge::new("ipac_warned_addresses", "Warned addresses as of the last cleanup"));
        register!(BLOCKED_SUBNETS, IntGauge::new("ipac_blocked_subnets", "Blocked IPv6 subnet groups as of the last cleanup"));
    });
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

#[inline]
fn inc(metric: &OnceLock<IntCounter>) {
    if let Some(c) = metric.get() {
        c.inc();
    }
}

#[inline]
fn set(metric: &OnceLock<IntGauge>, value: usize) {
    if let Some(g) = metric.get() {
        g.set(i64::try_from(value).unwrap_or(i64::MAX));
    }
}

#[inline]
pub fn record_address_blocked() {
    inc(&ADDRESSES_BLOCKED);
}

#[inline]
pub fn record_subnet_blocked() {
    inc(&SUBNETS_BLOCKED);
}

#[inline]
pub fn record_admission_denied() {
    inc(&ADMISSIONS_DENIED);
}

/// Record an applied auth event.
#[inline]
pub fn record_auth_event(event: &str) {
    if let Some(c) = AUTH_EVENTS.get() {
        c.with_label_values(&[event]).inc();
    }
}

/// Record a dispatched notification.
#[inline]
pub fn record_notification(kind: &str) {
    if let Some(c) = NOTIFICATIONS.get() {
        c.with_label_values(&[kind]).inc();
    }
}

/// Publish the aggregates computed by a cleanup tick.
pub fn set_aggregates(counts: &AggregateCounts) {
    set(&TRACKED_ADDRESSES, counts.total);
    set(&BLOCKED_ADDRESSES, counts.blocked);
    set(&WARNED_ADDRESSES, counts.warned);
    set(&BLOCKED_SUBNETS, counts.blocked_subnets);
}
