//! The admission engine.
//!
//! All state lives behind one lock. Every public operation runs as a single
//! critical section per call: look up, evaluate and write back without
//! releasing the lock in between, so concurrent calls on the same address
//! never lose an update.
//!
//! ```text
//!  callers ──▶ Engine ──lock──▶ EngineState ──▶ Effects
//!                                                 │
//!                  ┌──────────────────────────────┴─────────────┐
//!                  ▼ (queued under the lock)                    ▼ (after unlock)
//!          EnforcementQueue ──▶ dyn Enforcer              dyn Notifier
//!
//!  cleanup scheduler ──(every cleanup_interval_seconds)──▶ EngineState::cleanup
//! ```

use chrono::Utc;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, validate_engine};
use crate::enforcement::{EnforcementAction, EnforcementQueue, Enforcer};
use crate::error::{IpacError, IpacResult};
use crate::metrics;

mod admission;
mod auth;
mod cleanup;
pub mod notify;
mod record;
mod state;
pub mod subnet;

pub use auth::AuthEvent;
pub use cleanup::CleanupReport;
pub use notify::{ChannelNotifier, Notification, NotificationKind, Notifier};
pub use record::AddressRecord;
pub use state::{AggregateCounts, EngineStats};
pub use subnet::SubnetGroup;

use state::{Effects, EngineState};

pub(crate) struct EngineInner {
    config: EngineConfig,
    state: Mutex<EngineState>,
    queue: EnforcementQueue,
    notifier: Option<Arc<dyn Notifier>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EngineInner {
    /// Run `f` as one critical section, then release its side effects.
    ///
    /// Enforcement actions are queued before the lock is dropped so they keep
    /// decision order across threads; notifications go out afterwards.
    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState, &mut Effects) -> R) -> R {
        let mut effects = Effects::default();
        let result = {
            let mut state = self.state.lock();
            let result = f(&mut *state, &mut effects);
            for action in effects.actions.drain(..) {
                self.queue.submit(action);
            }
            result
        };
        self.dispatch(effects.notifications);
        result
    }

    fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            metrics::record_notification(notification.kind.as_str());
            match &self.notifier {
                Some(notifier) => notifier.notify(notification),
                None => debug!(kind = %notification.kind, "no notifier configured"),
            }
        }
    }

    fn cleanup_at(&self, now: chrono::DateTime<Utc>) -> CleanupReport {
        self.with_state(|state, effects| state.cleanup(now, effects))
    }

    fn stop_tasks(&self) {
        if let Some(handle) = self.scheduler.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        // The worker drains what is already queued and exits once the queue's
        // sender is dropped along with `self`.
        if let Some(handle) = self.scheduler.get_mut().take() {
            handle.abort();
        }
    }
}

/// Handle to a running engine.
///
/// Cheap to clone; every clone drives the same state. Dropping the last
/// clone stops the cleanup scheduler.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Start an engine on the current tokio runtime.
    ///
    /// Zero options take their defaults. Resets the enforcer to an empty rule
    /// set before any other action, then starts the enforcement worker and
    /// the cleanup scheduler.
    pub fn start(
        config: EngineConfig,
        enforcer: Arc<dyn Enforcer>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> IpacResult<Self> {
        let config = config.normalized();
        validate_engine(&config).map_err(IpacError::InvalidEngineConfig)?;
        let handle = Handle::try_current().map_err(|_| IpacError::NoRuntime)?;

        metrics::init();

        let (queue, worker) = EnforcementQueue::spawn(&handle, enforcer);
        queue.submit(EnforcementAction::ResetAll);

        let inner = Arc::new(EngineInner {
            state: Mutex::new(EngineState::new(config.clone(), Utc::now())),
            config,
            queue,
            notifier,
            scheduler: Mutex::new(None),
            worker: Mutex::new(Some(worker)),
        });

        let period = inner.config.cleanup_interval();
        let scheduler = cleanup::spawn_scheduler(&handle, Arc::downgrade(&inner), period);
        *inner.scheduler.lock() = Some(scheduler);

        info!(
            cleanup_interval_seconds = inner.config.cleanup_interval_seconds,
            block_duration_seconds = inner.config.block_duration_seconds,
            never_block = inner.config.never_block,
            "ipac engine started"
        );
        Ok(Self { inner })
    }

    /// The normalized configuration the engine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Record an inbound connection from `addr`; `false` means deny it.
    pub fn test_address_allowed(&self, addr: IpAddr) -> bool {
        let now = Utc::now();
        self.inner
            .with_state(|state, effects| state.test_address_allowed(addr, now, effects))
    }

    /// Whether `addr` is currently in the warn state.
    pub fn test_address_warn(&self, addr: IpAddr) -> bool {
        self.inner.state.lock().test_address_warn(&addr)
    }

    /// Snapshot of the record for `addr`, or a zero-valued record if it is
    /// not tracked.
    pub fn address_details(&self, addr: IpAddr) -> AddressRecord {
        self.inner
            .state
            .lock()
            .records
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| AddressRecord::unseen(addr))
    }

    pub fn apply_auth_event(&self, event: AuthEvent, addr: IpAddr) {
        let now = Utc::now();
        self.inner
            .with_state(|state, effects| state.apply_auth_event(event, addr, now, effects));
    }

    /// Like [`apply_auth_event`](Self::apply_auth_event) for an event name
    /// received as text.
    pub fn apply_auth_event_str(&self, event: &str, addr: IpAddr) -> IpacResult<()> {
        match event.parse::<AuthEvent>() {
            Ok(event) => {
                self.apply_auth_event(event, addr);
                Ok(())
            }
            Err(e) => {
                warn!(%addr, event, "rejected auth event");
                Err(e)
            }
        }
    }

    /// Discard all state and lift every block on the next cleanup tick.
    ///
    /// Until then writes are suppressed and reads answer from current state.
    pub fn request_purge(&self) {
        self.inner.state.lock().purge_pending = true;
        info!("purge requested");
    }

    /// Run one cleanup tick now, on the caller's thread.
    pub fn run_cleanup(&self) -> CleanupReport {
        self.inner.cleanup_at(Utc::now())
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.state.lock().stats()
    }

    /// Wait until every enforcement action decided so far has been applied.
    pub async fn settle(&self) {
        self.inner.queue.settle().await;
    }

    /// Stop the cleanup scheduler and the enforcement worker.
    ///
    /// Actions still queued are dropped. The in-memory state stays readable.
    pub fn shutdown(&self) {
        self.inner.stop_tasks();
        info!("ipac engine stopped");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
