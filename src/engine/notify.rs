//! Operator notifications and the batcher that accumulates them between
//! cleanup ticks.
//!
//! Blocked addresses and absurd-auth addresses are batched and flushed by the
//! cleanup scheduler; subnet blocks bypass the batcher and are emitted as
//! soon as they happen.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    IpsBlocked,
    IpsExceededAbsurdAuthAttempts,
    SubnetBlocked,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpsBlocked => "ips_blocked",
            Self::IpsExceededAbsurdAuthAttempts => "ips_exceeded_absurd_auth_attempts",
            Self::SubnetBlocked => "subnet_blocked",
        }
    }

    /// Human-readable summary sent along with the address list.
    pub fn message(&self) -> &'static str {
        match self {
            Self::IpsBlocked => "IP addresses blocked.",
            Self::IpsExceededAbsurdAuthAttempts => {
                "Too many failed login attempts from IP Addresses that are already authenticated."
            }
            Self::SubnetBlocked => "IPv6 Subnet Blocked",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    /// Addresses, or IPv6 group prefixes for `subnet_blocked`.
    pub addresses: Vec<String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, addresses: Vec<String>) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
            addresses,
        }
    }
}

/// Receives notifications from the engine.
///
/// Called after the engine has released its state lock. Implementations
/// should hand the notification off and return quickly; the engine neither
/// waits for delivery nor retries.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<F> Notifier for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}

/// Notifier that forwards into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    /// Create a notifier together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            debug!(kind = %e.0.kind, "notification receiver dropped");
        }
    }
}

/// Pending notification lists between cleanup ticks.
#[derive(Debug, Default)]
pub(crate) struct NotificationBatcher {
    blocked: Vec<String>,
    absurd: Vec<String>,
    last_absurd_at: Option<DateTime<Utc>>,
}

impl NotificationBatcher {
    pub(crate) fn push_blocked(&mut self, addr: String) {
        self.blocked.push(addr);
    }

    /// Queue an absurd-auth address once per batch.
    pub(crate) fn push_absurd(&mut self, addr: String) {
        if !self.absurd.contains(&addr) {
            self.absurd.push(addr);
        }
    }

    /// Drain whatever is due.
    ///
    /// Blocked addresses always flush. Absurd-auth addresses flush only when
    /// at least `absurd_interval_secs` have passed since the last absurd-auth
    /// notification; until then they keep accumulating.
    pub(crate) fn flush(
        &mut self,
        now: DateTime<Utc>,
        absurd_interval_secs: i64,
    ) -> Vec<Notification> {
        let mut out = Vec::new();

        if !self.blocked.is_empty() {
            out.push(Notification::new(
                NotificationKind::IpsBlocked,
                std::mem::take(&mut self.blocked),
            ));
        }

        let absurd_due = self
            .last_absurd_at
            .is_none_or(|last| (now - last).num_seconds() >= absurd_interval_secs);
        if !self.absurd.is_empty() && absurd_due {
            out.push(Notification::new(
                NotificationKind::IpsExceededAbsurdAuthAttempts,
                std::mem::take(&mut self.absurd),
            ));
            self.last_absurd_at = Some(now);
        }

        out
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> (usize, usize) {
        (self.blocked.len(), self.absurd.len())
    }
}
