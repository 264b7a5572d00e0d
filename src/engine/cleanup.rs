//! Periodic expiry, aggregate recomputation and notification flushing.
//!
//! Each tick either services a pending purge or:
//!
//! 1. computes `expire_older_than = block_duration - seconds since last tick`
//! 2. drops records older than that, unblocking blocked ones first
//! 3. sweeps IPv6 subnet groups
//! 4. flushes the notification batches that are due
//!
//! The drift correction in step 1 can go negative after a long stall, which
//! expires every record on that tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Weak;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::EngineInner;
use super::state::{AggregateCounts, Effects, EngineState};
use crate::enforcement::EnforcementAction;
use crate::metrics;

/// What a single cleanup tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// The tick serviced a purge and skipped everything else.
    pub purged: bool,
    pub expired_records: usize,
    pub unblocked_subnets: usize,
    pub removed_subnets: usize,
    pub counts: AggregateCounts,
}

impl EngineState {
    pub(crate) fn cleanup(&mut self, now: DateTime<Utc>, effects: &mut Effects) -> CleanupReport {
        if self.purge_pending {
            return self.purge(effects);
        }

        let since_last = (now - self.last_cleanup_at).num_seconds();
        let expire_older_than = self.config.block_duration_secs_i64() - since_last;

        let mut report = CleanupReport::default();
        let mut counts = AggregateCounts::default();

        self.records.retain(|addr, record| {
            if record.age_secs(now) > expire_older_than {
                if record.blocked {
                    effects.enforce(EnforcementAction::UnblockAddress(*addr));
                }
                debug!(%addr, blocked = record.blocked, "address record expired");
                report.expired_records += 1;
                return false;
            }
            counts.total += 1;
            if record.blocked {
                counts.blocked += 1;
            }
            if record.warn {
                counts.warned += 1;
            }
            true
        });

        let sweep = self.subnets.sweep(now, expire_older_than, effects);
        counts.blocked_subnets = sweep.blocked;
        report.unblocked_subnets = sweep.unblocked;
        report.removed_subnets = sweep.removed;

        let absurd_interval = self.config.block_duration_secs_i64();
        for notification in self.batcher.flush(now, absurd_interval) {
            effects.notify(notification);
        }

        self.counts = counts;
        self.last_cleanup_at = now;
        metrics::set_aggregates(&counts);
        report.counts = counts;

        info!(
            expire_older_than,
            expired = report.expired_records,
            total = counts.total,
            blocked = counts.blocked,
            warned = counts.warned,
            blocked_subnets = counts.blocked_subnets,
            "cleanup completed"
        );
        report
    }

    /// Discard everything and lift every block. Pending notifications are
    /// kept for the next regular tick.
    fn purge(&mut self, effects: &mut Effects) -> CleanupReport {
        let records = self.records.len();
        let groups = self.subnets.len();

        self.records.clear();
        self.subnets.clear();
        effects.enforce(EnforcementAction::UnblockAll);
        self.purge_pending = false;
        self.counts = AggregateCounts::default();
        metrics::set_aggregates(&self.counts);

        info!(records, groups, "purge completed");
        CleanupReport {
            purged: true,
            ..CleanupReport::default()
        }
    }
}

/// Run cleanup every `period` until the engine is dropped.
///
/// The first tick fires one full period after start.
pub(super) fn spawn_scheduler(
    handle: &Handle,
    inner: Weak<EngineInner>,
    period: Duration,
) -> JoinHandle<()> {
    handle.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.cleanup_at(Utc::now());
        }
        debug!("cleanup scheduler stopped");
    })
}
