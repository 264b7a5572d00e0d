//! In-memory enforcer that records every call.
//!
//! Useful for embedding the engine where the firewall is managed elsewhere,
//! and for asserting enforcement behavior in tests.

use async_trait::async_trait;
use ipnet::Ipv6Net;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::IpAddr;

use super::{EnforcementAction, Enforcer};

#[derive(Debug, Default)]
struct Recorded {
    actions: Vec<EnforcementAction>,
    addresses: HashSet<IpAddr>,
    subnets: HashSet<Ipv6Net>,
}

/// Enforcer that keeps the rule set in memory and logs every action.
#[derive(Debug, Default)]
pub struct RecordingEnforcer {
    inner: Mutex<Recorded>,
}

impl RecordingEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action applied so far, oldest first.
    pub fn actions(&self) -> Vec<EnforcementAction> {
        self.inner.lock().actions.clone()
    }

    /// Number of applied actions equal to `action`.
    pub fn count(&self, action: EnforcementAction) -> usize {
        self.inner
            .lock()
            .actions
            .iter()
            .filter(|a| **a == action)
            .count()
    }

    pub fn is_address_blocked(&self, addr: IpAddr) -> bool {
        self.inner.lock().addresses.contains(&addr)
    }

    pub fn is_subnet_blocked(&self, subnet: &Ipv6Net) -> bool {
        self.inner.lock().subnets.contains(subnet)
    }

    /// Number of address and subnet rules currently in place.
    pub fn rule_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.addresses.len() + inner.subnets.len()
    }

    fn record(&self, action: EnforcementAction) {
        let mut inner = self.inner.lock();
        match action {
            EnforcementAction::ResetAll | EnforcementAction::UnblockAll => {
                inner.addresses.clear();
                inner.subnets.clear();
            }
            EnforcementAction::BlockAddress(addr) => {
                inner.addresses.insert(addr);
            }
            EnforcementAction::UnblockAddress(addr) => {
                inner.addresses.remove(&addr);
            }
            EnforcementAction::BlockSubnet(net) => {
                inner.subnets.insert(net);
            }
            EnforcementAction::UnblockSubnet(net) => {
                inner.subnets.remove(&net);
            }
        }
        inner.actions.push(action);
    }
}

#[async_trait]
impl Enforcer for RecordingEnforcer {
    async fn reset_all(&self) {
        self.record(EnforcementAction::ResetAll);
    }

    async fn unblock_all(&self) {
        self.record(EnforcementAction::UnblockAll);
    }

    async fn block_address(&self, addr: IpAddr) {
        self.record(EnforcementAction::BlockAddress(addr));
    }

    async fn unblock_address(&self, addr: IpAddr) {
        self.record(EnforcementAction::UnblockAddress(addr));
    }

    async fn block_subnet(&self, subnet: Ipv6Net) {
        self.record(EnforcementAction::BlockSubnet(subnet));
    }

    async fn unblock_subnet(&self, subnet: Ipv6Net) {
        self.record(EnforcementAction::UnblockSubnet(subnet));
    }
}
