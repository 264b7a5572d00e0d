//! IPv6 subnet aggregation.
//!
//! Attackers with an IPv6 allocation can rotate through addresses faster than
//! per-address blocking catches up. Every blocked IPv6 address is counted
//! against a ladder of ranked group prefixes; once enough distinct banned
//! addresses fall under a prefix, the whole prefix is blocked.
//!
//! With `depth = 4` and address `aaaa:bbbb:cccc:dddd:eeee:ffff:1111:2222`:
//!
//! ```text
//! prefix                              groups  breaches at
//! aaaa:bbbb:cccc:dddd                   4     factor^4
//! aaaa:bbbb:cccc:dddd:eeee              5     factor^3
//! aaaa:bbbb:cccc:dddd:eeee:ffff         6     factor^2
//! aaaa:bbbb:cccc:dddd:eeee:ffff:1111    7     factor^1
//! ```

use chrono::{DateTime, Utc};
use ipnet::Ipv6Net;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::Ipv6Addr;
use tracing::{debug, info};

use super::notify::{Notification, NotificationKind};
use super::state::Effects;
use crate::enforcement::EnforcementAction;
use crate::metrics;

/// Number of 16-bit groups in an IPv6 address.
pub const IPV6_GROUPS: usize = 8;

/// Render an address as 8 explicit, zero-padded, lowercase hex groups.
pub fn canonical_groups(addr: &Ipv6Addr) -> Vec<String> {
    addr.segments().iter().map(|s| format!("{s:04x}")).collect()
}

/// Ranked group prefixes for `addr`, widest first.
///
/// Produces `depth` prefixes of `8 - depth` through `7` groups.
pub fn ranked_prefixes(addr: &Ipv6Addr, depth: u32) -> Vec<String> {
    let groups = canonical_groups(addr);
    let depth = (depth as usize).min(IPV6_GROUPS - 1);
    (0..depth)
        .map(|g| groups[..IPV6_GROUPS - depth + g].join(":"))
        .collect()
}

/// Number of groups in a colon-delimited prefix.
pub fn prefix_groups(prefix: &str) -> usize {
    prefix.split(':').count()
}

/// Banned addresses needed before a prefix of `groups` groups is blocked.
///
/// The narrowest prefix (7 groups) breaches at `factor`; each group removed
/// multiplies the requirement by `factor`.
pub fn breach_threshold(groups: usize, factor: u64) -> u64 {
    let exponent = IPV6_GROUPS.saturating_sub(groups) as u32;
    factor.saturating_pow(exponent)
}

/// Network covered by a prefix: trailing groups zero-filled, prefix length
/// `16 * groups`. Returns `None` if the prefix is not hex groups.
pub fn prefix_to_net(prefix: &str) -> Option<Ipv6Net> {
    let mut segments = [0u16; IPV6_GROUPS];
    let mut count = 0;
    for (slot, group) in segments.iter_mut().zip(prefix.split(':')) {
        *slot = u16::from_str_radix(group, 16).ok()?;
        count += 1;
    }
    if count != prefix_groups(prefix) {
        return None;
    }
    let prefix_len = u8::try_from(count * 16).ok()?;
    Ipv6Net::new(Ipv6Addr::from(segments), prefix_len).ok()
}

/// Aggregated ban state for one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetGroup {
    pub prefix: String,
    /// Distinct banned addresses counted under this prefix.
    pub ban_count: u64,
    pub created_at: DateTime<Utc>,
    /// Set while the prefix is blocked.
    pub blocked_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) banned: HashSet<Ipv6Addr>,
}

impl SubnetGroup {
    fn new(prefix: String, now: DateTime<Utc>) -> Self {
        Self {
            prefix,
            ban_count: 0,
            created_at: now,
            blocked_at: None,
            banned: HashSet::new(),
        }
    }

    /// Count `addr` once; returns `false` if it was already counted.
    fn count_ban(&mut self, addr: Ipv6Addr) -> bool {
        if !self.banned.insert(addr) {
            return false;
        }
        self.ban_count += 1;
        true
    }

    pub fn groups(&self) -> usize {
        prefix_groups(&self.prefix)
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_at.is_some()
    }

    pub fn has_breached(&self, factor: u64) -> bool {
        self.ban_count >= breach_threshold(self.groups(), factor)
    }

    pub fn net(&self) -> Option<Ipv6Net> {
        prefix_to_net(&self.prefix)
    }

    /// Block this group: stamp it, queue the rule and notify right away.
    fn block(&mut self, now: DateTime<Utc>, effects: &mut Effects) {
        self.blocked_at = Some(now);
        if let Some(net) = self.net() {
            effects.enforce(EnforcementAction::BlockSubnet(net));
        }
        effects.notify(Notification::new(
            NotificationKind::SubnetBlocked,
            vec![self.prefix.clone()],
        ));
        metrics::record_subnet_blocked();
        info!(prefix = %self.prefix, bans = self.ban_count, "IPv6 subnet blocked");
    }
}

/// Outcome of a subnet sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubnetSweep {
    pub(crate) blocked: usize,
    pub(crate) unblocked: usize,
    pub(crate) removed: usize,
}

/// All tracked subnet groups.
#[derive(Debug)]
pub(crate) struct SubnetAggregator {
    groups: HashMap<String, SubnetGroup>,
    depth: u32,
    factor: u64,
}

impl SubnetAggregator {
    pub(crate) fn new(depth: u32, factor: u64) -> Self {
        Self {
            groups: HashMap::new(),
            depth,
            factor,
        }
    }

    /// Count a newly blocked address against each of its ranked prefixes and
    /// block any prefix that reaches its threshold.
    ///
    /// An address that is blocked again while its groups are still tracked
    /// is not counted twice.
    pub(crate) fn record_ban(
        &mut self,
        addr: &Ipv6Addr,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) {
        for prefix in ranked_prefixes(addr, self.depth) {
            let group = self
                .groups
                .entry(prefix.clone())
                .or_insert_with(|| SubnetGroup::new(prefix, now));
            if !group.count_ban(*addr) {
                continue;
            }
            if !group.is_blocked() && group.has_breached(self.factor) {
                group.block(now, effects);
            }
        }
    }

    /// Expire old blocks, re-check thresholds and drop idle groups.
    ///
    /// Ages are compared against `expire_older_than` seconds.
    pub(crate) fn sweep(
        &mut self,
        now: DateTime<Utc>,
        expire_older_than: i64,
        effects: &mut Effects,
    ) -> SubnetSweep {
        let factor = self.factor;
        let mut sweep = SubnetSweep::default();

        self.groups.retain(|_, group| {
            if let Some(blocked_at) = group.blocked_at {
                if (now - blocked_at).num_seconds() > expire_older_than {
                    if let Some(net) = group.net() {
                        effects.enforce(EnforcementAction::UnblockSubnet(net));
                    }
                    debug!(prefix = %group.prefix, "IPv6 subnet block expired");
                    sweep.unblocked += 1;
                    return false;
                }
                sweep.blocked += 1;
                return true;
            }

            if group.has_breached(factor) {
                group.block(now, effects);
                sweep.blocked += 1;
                return true;
            }

            if (now - group.created_at).num_seconds() > expire_older_than {
                sweep.removed += 1;
                return false;
            }
            true
        });

        sweep
    }

    pub(crate) fn get(&self, prefix: &str) -> Option<&SubnetGroup> {
        self.groups.get(prefix)
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn clear(&mut self) {
        self.groups.clear();
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, group: SubnetGroup) {
        self.groups.insert(group.prefix.clone(), group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn v6(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn canonical_form_expands_shorthand() {
        assert_eq!(
            canonical_groups(&v6("2041:0:140F::875B:131B")).join(":"),
            "2041:0000:140f:0000:0000:0000:875b:131b"
        );
        assert_eq!(
            canonical_groups(&v6("2001:1:2:3:4:5:6:7")).join(":"),
            "2001:0001:0002:0003:0004:0005:0006:0007"
        );
    }

    #[test]
    fn ranked_prefixes_depth_four() {
        let prefixes = ranked_prefixes(&v6("2001:0db8:0000:0000:0000:ff00:0042:8329"), 4);
        assert_eq!(
            prefixes,
            vec![
                "2001:0db8:0000:0000",
                "2001:0db8:0000:0000:0000",
                "2001:0db8:0000:0000:0000:ff00",
                "2001:0db8:0000:0000:0000:ff00:0042",
            ]
        );
        let lengths: Vec<usize> = prefixes.iter().map(|p| prefix_groups(p)).collect();
        assert_eq!(lengths, vec![4, 5, 6, 7]);
    }

    #[test]
    fn ranked_prefixes_other_depths() {
        let addr = v6("2001:db8::1");
        assert_eq!(ranked_prefixes(&addr, 1), vec!["2001:0db8:0000:0000:0000:0000:0000"]);
        let deep = ranked_prefixes(&addr, 7);
        assert_eq!(deep.len(), 7);
        assert_eq!(deep[0], "2001");
    }

    #[test]
    fn breach_threshold_scales_geometrically() {
        assert_eq!(breach_threshold(7, 40), 40);
        assert_eq!(breach_threshold(6, 40), 1_600);
        assert_eq!(breach_threshold(5, 40), 64_000);
        assert_eq!(breach_threshold(4, 40), 2_560_000);
        // saturates instead of overflowing
        assert_eq!(breach_threshold(1, u64::MAX), u64::MAX);
    }

    #[test]
    fn prefix_zero_fills_to_full_address() {
        let net = prefix_to_net("2001:0db8:00ff:0000").unwrap();
        assert_eq!(net.prefix_len(), 64);
        assert_eq!(
            canonical_groups(&net.addr()).join(":"),
            "2001:0db8:00ff:0000:0000:0000:0000:0000"
        );
        assert!(prefix_to_net("2001:zzzz").is_none());
        assert!(prefix_to_net("1:2:3:4:5:6:7:8:9").is_none());
    }

    #[test]
    fn narrowest_group_breaches_at_factor() {
        let mut agg = SubnetAggregator::new(4, 40);
        let mut effects = Effects::default();
        let now = Utc::now();

        for host in 1..40u16 {
            let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0xff00, 0x42, host);
            agg.record_ban(&addr, now, &mut effects);
        }
        let narrow = "2001:0db8:0000:0000:0000:ff00:0042";
        assert_eq!(agg.get(narrow).unwrap().ban_count, 39);
        assert!(!agg.get(narrow).unwrap().is_blocked());
        assert!(effects.actions.is_empty());

        agg.record_ban(&Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0xff00, 0x42, 40), now, &mut effects);
        let group = agg.get(narrow).unwrap();
        assert!(group.is_blocked());
        assert_eq!(
            effects.actions,
            vec![EnforcementAction::BlockSubnet(
                "2001:db8::ff00:42:0/112".parse().unwrap()
            )]
        );
        assert_eq!(effects.notifications.len(), 1);
        assert_eq!(effects.notifications[0].kind, NotificationKind::SubnetBlocked);
        assert_eq!(effects.notifications[0].addresses, vec![narrow.to_string()]);

        // wider groups are still far from their thresholds
        assert!(!agg.get("2001:0db8:0000:0000:0000:ff00").unwrap().is_blocked());
    }

    #[test]
    fn reblocked_address_is_counted_once() {
        let mut agg = SubnetAggregator::new(1, 2);
        let mut effects = Effects::default();
        let now = Utc::now();
        let addr = v6("2001:db8::1");

        agg.record_ban(&addr, now, &mut effects);
        agg.record_ban(&addr, now + Duration::seconds(5), &mut effects);

        let group = agg.get("2001:0db8:0000:0000:0000:0000:0000").unwrap();
        assert_eq!(group.ban_count, 1);
        assert!(!group.is_blocked());
        assert!(effects.actions.is_empty());
        assert!(effects.notifications.is_empty());

        agg.record_ban(&v6("2001:db8::2"), now + Duration::seconds(10), &mut effects);
        let group = agg.get("2001:0db8:0000:0000:0000:0000:0000").unwrap();
        assert_eq!(group.ban_count, 2);
        assert!(group.is_blocked());
    }

    #[test]
    fn sweep_expires_old_blocks_and_rechecks_thresholds() {
        let mut agg = SubnetAggregator::new(4, 40);
        let mut effects = Effects::default();
        let now = Utc::now();

        let mut expired = SubnetGroup::new("2001:0db8:0000:0000:0000:0000:0001".into(), now);
        expired.ban_count = 40;
        expired.blocked_at = Some(now - Duration::seconds(4000));
        agg.insert(expired);

        let mut fresh = SubnetGroup::new("2001:0db8:0000:0000:0000:0000:0002".into(), now);
        fresh.ban_count = 40;
        fresh.blocked_at = Some(now - Duration::seconds(10));
        agg.insert(fresh);

        // crossed its threshold without being blocked yet
        let mut pending = SubnetGroup::new("2001:0db8:0000:0000:0000:0000:0003".into(), now);
        pending.ban_count = 41;
        agg.insert(pending);

        let mut idle = SubnetGroup::new(
            "2001:0db8:0000:0000:0000:0000:0004".into(),
            now - Duration::seconds(4000),
        );
        idle.ban_count = 1;
        agg.insert(idle);

        let sweep = agg.sweep(now, 3600, &mut effects);
        assert_eq!(
            sweep,
            SubnetSweep {
                blocked: 2,
                unblocked: 1,
                removed: 1,
            }
        );
        assert_eq!(agg.len(), 2);
        assert!(agg.get("2001:0db8:0000:0000:0000:0000:0003").unwrap().is_blocked());
        assert!(effects.actions.contains(&EnforcementAction::UnblockSubnet(
            "2001:db8::1:0/112".parse().unwrap()
        )));
        assert!(effects.actions.contains(&EnforcementAction::BlockSubnet(
            "2001:db8::3:0/112".parse().unwrap()
        )));
    }
}
