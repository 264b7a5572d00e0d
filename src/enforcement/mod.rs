//! Firewall enforcement collaborator.
//!
//! The engine decides *what* to block under its state lock; an [`Enforcer`]
//! decides *how*. Decisions are queued in the order they were made and a
//! single worker task applies them, so slow firewall commands never run
//! inside the critical section and a block is never overtaken by the
//! matching unblock.
//!
//! ```text
//! admission / auth / cleanup ──(under lock)──▶ EnforcementQueue
//!                                                    │ mpsc, ordered
//!                                                    ▼
//!                                             worker task ──▶ dyn Enforcer
//! ```

use async_trait::async_trait;
use ipnet::Ipv6Net;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

pub mod iptables;
pub mod noop;
pub mod recording;

pub use iptables::{EnforcementError, IptablesEnforcer};
pub use noop::NoopEnforcer;
pub use recording::RecordingEnforcer;

/// OS-level packet filter operations required by the engine.
///
/// Implementations must be idempotent and best-effort: a failure is logged
/// by the implementation and never reported back to the engine, whose
/// in-memory state stays authoritative for admission decisions.
#[async_trait]
pub trait Enforcer: Send + Sync {
    /// Remove every rule this engine may have created and start empty.
    async fn reset_all(&self);

    /// Lift every block at once (administrative purge).
    async fn unblock_all(&self);

    /// Drop all traffic from a single address.
    async fn block_address(&self, addr: IpAddr);

    /// Remove the rule added by [`block_address`](Self::block_address).
    async fn unblock_address(&self, addr: IpAddr);

    /// Drop all traffic from an IPv6 subnet.
    async fn block_subnet(&self, subnet: Ipv6Net);

    /// Remove the rule added by [`block_subnet`](Self::block_subnet).
    async fn unblock_subnet(&self, subnet: Ipv6Net);
}

/// A single enforcement decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnforcementAction {
    ResetAll,
    UnblockAll,
    BlockAddress(IpAddr),
    UnblockAddress(IpAddr),
    BlockSubnet(Ipv6Net),
    UnblockSubnet(Ipv6Net),
}

impl EnforcementAction {
    /// Carry out this action against an enforcer.
    pub async fn apply(self, enforcer: &dyn Enforcer) {
        match self {
            Self::ResetAll => enforcer.reset_all().await,
            Self::UnblockAll => enforcer.unblock_all().await,
            Self::BlockAddress(addr) => enforcer.block_address(addr).await,
            Self::UnblockAddress(addr) => enforcer.unblock_address(addr).await,
            Self::BlockSubnet(net) => enforcer.block_subnet(net).await,
            Self::UnblockSubnet(net) => enforcer.unblock_subnet(net).await,
        }
    }
}

impl fmt::Display for EnforcementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResetAll => write!(f, "reset_all"),
            Self::UnblockAll => write!(f, "unblock_all"),
            Self::BlockAddress(addr) => write!(f, "block_address {addr}"),
            Self::UnblockAddress(addr) => write!(f, "unblock_address {addr}"),
            Self::BlockSubnet(net) => write!(f, "block_subnet {net}"),
            Self::UnblockSubnet(net) => write!(f, "unblock_subnet {net}"),
        }
    }
}

enum QueueItem {
    Action(EnforcementAction),
    /// Completed once every earlier item has been applied.
    Barrier(oneshot::Sender<()>),
}

/// Ordered hand-off from the engine's critical sections to the worker task.
pub(crate) struct EnforcementQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl EnforcementQueue {
    /// Create the queue and spawn its worker on `handle`.
    ///
    /// The worker exits once every sender is gone and the queue is drained.
    pub(crate) fn spawn(handle: &Handle, enforcer: Arc<dyn Enforcer>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueueItem>();
        let worker = handle.spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    QueueItem::Action(action) => {
                        debug!(%action, "applying enforcement action");
                        action.apply(enforcer.as_ref()).await;
                    }
                    QueueItem::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("enforcement worker stopped");
        });
        (Self { tx }, worker)
    }

    /// Queue an action behind everything submitted before it.
    pub(crate) fn submit(&self, action: EnforcementAction) {
        if self.tx.send(QueueItem::Action(action)).is_err() {
            debug!(%action, "enforcement worker gone, action dropped");
        }
    }

    /// Wait until every action submitted so far has been applied.
    ///
    /// Returns immediately if the worker has been stopped.
    pub(crate) async fn settle(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(QueueItem::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_applies_actions_in_submission_order() {
        let enforcer = Arc::new(RecordingEnforcer::new());
        let (queue, _worker) = EnforcementQueue::spawn(&Handle::current(), enforcer.clone());

        let addr: IpAddr = "192.0.2.7".parse().unwrap();
        queue.submit(EnforcementAction::ResetAll);
        queue.submit(EnforcementAction::BlockAddress(addr));
        queue.submit(EnforcementAction::UnblockAddress(addr));
        queue.settle().await;

        assert_eq!(
            enforcer.actions(),
            vec![
                EnforcementAction::ResetAll,
                EnforcementAction::BlockAddress(addr),
                EnforcementAction::UnblockAddress(addr),
            ]
        );
        assert!(!enforcer.is_address_blocked(addr));
    }

    #[tokio::test]
    async fn settle_returns_when_worker_is_gone() {
        let enforcer = Arc::new(RecordingEnforcer::new());
        let (queue, worker) = EnforcementQueue::spawn(&Handle::current(), enforcer.clone());
        worker.abort();
        let _ = worker.await;

        queue.submit(EnforcementAction::UnblockAll);
        queue.settle().await;
        assert!(enforcer.actions().is_empty());
    }

    #[test]
    fn action_display_names_the_target() {
        let net: Ipv6Net = "2001:db8::/32".parse().unwrap();
        assert_eq!(
            EnforcementAction::BlockSubnet(net).to_string(),
            "block_subnet 2001:db8::/32"
        );
    }
}
