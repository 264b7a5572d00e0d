//! Shared engine state guarded by the engine's single lock.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::notify::{Notification, NotificationBatcher};
use super::record::RecordStore;
use super::subnet::SubnetAggregator;
use crate::config::EngineConfig;
use crate::enforcement::EnforcementAction;

/// Aggregate counts recomputed by every cleanup tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub total: usize,
    pub blocked: usize,
    pub warned: usize,
    pub blocked_subnets: usize,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Counts as of the last completed cleanup tick.
    pub last_cleanup: AggregateCounts,
    pub last_cleanup_at: DateTime<Utc>,
    /// Records currently held, including ones created since the last tick.
    pub tracked_records: usize,
    pub subnet_groups: usize,
    pub purge_pending: bool,
}

/// Side effects decided inside a critical section.
///
/// Enforcement actions are queued before the lock is released so they apply
/// in decision order; notifications are dispatched after it is released.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub(crate) actions: Vec<EnforcementAction>,
    pub(crate) notifications: Vec<Notification>,
}

impl Effects {
    pub(crate) fn enforce(&mut self, action: EnforcementAction) {
        self.actions.push(action);
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }
}

#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) records: RecordStore,
    pub(crate) subnets: SubnetAggregator,
    pub(crate) batcher: NotificationBatcher,
    pub(crate) purge_pending: bool,
    pub(crate) last_cleanup_at: DateTime<Utc>,
    pub(crate) counts: AggregateCounts,
}

impl EngineState {
    /// Fresh state. `config` must already be normalized.
    pub(crate) fn new(config: EngineConfig, now: DateTime<Utc>) -> Self {
        let subnets = SubnetAggregator::new(
            config.ipv6_subnet_group_depth,
            config.ipv6_subnet_breach_factor,
        );
        Self {
            config,
            records: RecordStore::default(),
            subnets,
            batcher: NotificationBatcher::default(),
            purge_pending: false,
            last_cleanup_at: now,
            counts: AggregateCounts::default(),
        }
    }

    pub(crate) fn stats(&self) -> EngineStats {
        EngineStats {
            last_cleanup: self.counts,
            last_cleanup_at: self.last_cleanup_at,
            tracked_records: self.records.len(),
            subnet_groups: self.subnets.len(),
            purge_pending: self.purge_pending,
        }
    }
}
