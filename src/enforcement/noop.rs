//! No-op enforcer that leaves the packet filter untouched.
//!
//! Used when the engine only needs to answer admission checks, e.g. behind
//! a load balancer that cannot see the client address at the OS layer.

use async_trait::async_trait;
use ipnet::Ipv6Net;
use std::net::IpAddr;
use tracing::debug;

use super::Enforcer;

pub struct NoopEnforcer;

#[async_trait]
impl Enforcer for NoopEnforcer {
    async fn reset_all(&self) {}

    async fn unblock_all(&self) {}

    async fn block_address(&self, addr: IpAddr) {
        debug!(%addr, "enforcement disabled, not blocking address");
    }

    async fn unblock_address(&self, _addr: IpAddr) {}

    async fn block_subnet(&self, subnet: Ipv6Net) {
        debug!(%subnet, "enforcement disabled, not blocking subnet");
    }

    async fn unblock_subnet(&self, _subnet: Ipv6Net) {}
}
