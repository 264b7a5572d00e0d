//! Integration tests for cleanup, purge, notifications and subnet blocking.

mod common;

use common::TestEngine;
use ipac_ng::{AddressRecord, AuthEvent, EnforcementAction, EngineConfig, NotificationKind};
use ipnet::Ipv6Net;
use std::net::{IpAddr, Ipv6Addr};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_purge_clears_everything_with_one_unblock_all() {
    let t = TestEngine::start(EngineConfig {
        block_after_new_connections: 1,
        ..EngineConfig::default()
    });
    let blocked = ip("192.0.2.1");
    let v6 = ip("2001:db8::1");

    assert!(!t.engine.test_address_allowed(blocked));
    assert!(!t.engine.test_address_allowed(v6));
    assert_eq!(t.engine.stats().subnet_groups, 4);

    t.engine.request_purge();
    assert!(t.engine.stats().purge_pending);

    // reads still answer, writes are suppressed
    assert!(!t.engine.test_address_allowed(blocked));
    assert!(t.engine.test_address_allowed(ip("192.0.2.2")));
    t.engine.apply_auth_event(AuthEvent::ValidLogin, blocked);
    assert!(t.engine.address_details(blocked).blocked);

    let report = t.engine.run_cleanup();
    assert!(report.purged);

    let stats = t.engine.stats();
    assert_eq!(stats.tracked_records, 0);
    assert_eq!(stats.subnet_groups, 0);
    assert!(!stats.purge_pending);
    assert_eq!(
        t.engine.address_details(blocked),
        AddressRecord::unseen(blocked)
    );

    t.engine.settle().await;
    assert_eq!(t.enforcer.count(EnforcementAction::UnblockAll), 1);
    assert_eq!(t.enforcer.rule_count(), 0);
}

#[tokio::test]
async fn test_blocked_addresses_are_notified_on_cleanup() {
    let mut t = TestEngine::start(EngineConfig {
        block_after_new_connections: 2,
        ..EngineConfig::default()
    });

    for addr in ["192.0.2.10", "192.0.2.11"] {
        t.engine.test_address_allowed(ip(addr));
        t.engine.test_address_allowed(ip(addr));
    }
    assert!(t.drain_notifications().is_empty());

    let report = t.engine.run_cleanup();
    assert_eq!(report.counts.blocked, 2);
    assert_eq!(report.counts.total, 2);

    let notifications = t.drain_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::IpsBlocked);
    assert_eq!(notifications[0].message, "IP addresses blocked.");
    assert_eq!(
        notifications[0].addresses,
        vec!["192.0.2.10".to_string(), "192.0.2.11".to_string()]
    );

    // already flushed
    t.engine.run_cleanup();
    assert!(t.drain_notifications().is_empty());
}

#[tokio::test]
async fn test_absurd_auth_attempts_are_notified() {
    let mut t = TestEngine::start(EngineConfig {
        notify_after_absurd_auth_attempts: 3,
        ..EngineConfig::default()
    });
    let addr = ip("192.0.2.20");

    t.engine.apply_auth_event(AuthEvent::ValidLogin, addr);
    for _ in 0..3 {
        t.engine.apply_auth_event(AuthEvent::InvalidLogin, addr);
    }
    let details = t.engine.address_details(addr);
    assert!(details.authenticated);
    assert_eq!(details.absurd_auth_attempts, 3);

    assert!(t.engine.test_address_allowed(addr));
    assert!(t.engine.test_address_allowed(addr));
    t.engine.run_cleanup();

    let notifications = t.drain_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].kind,
        NotificationKind::IpsExceededAbsurdAuthAttempts
    );
    assert_eq!(notifications[0].addresses, vec!["192.0.2.20".to_string()]);

    // rate limited for a full block duration
    t.engine.test_address_allowed(addr);
    t.engine.run_cleanup();
    assert!(t.drain_notifications().is_empty());
}

#[tokio::test]
async fn test_ipv6_rotation_blocks_subnet() {
    let mut t = TestEngine::start(EngineConfig {
        block_after_new_connections: 1,
        ipv6_subnet_group_depth: 2,
        ipv6_subnet_breach_factor: 3,
        ..EngineConfig::default()
    });

    // three hosts under one /112 breach the narrowest group (3^1)
    for host in 1..=3u16 {
        let addr = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0xab, host));
        assert!(!t.engine.test_address_allowed(addr));
    }

    let notifications = t.drain_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::SubnetBlocked);
    assert_eq!(
        notifications[0].addresses,
        vec!["2001:0db8:0000:0000:0000:0000:00ab".to_string()]
    );

    t.engine.settle().await;
    let narrow: Ipv6Net = "2001:db8::ab:0/112".parse().unwrap();
    let wide: Ipv6Net = "2001:db8::/96".parse().unwrap();
    assert!(t.enforcer.is_subnet_blocked(&narrow));
    assert!(!t.enforcer.is_subnet_blocked(&wide));

    let report = t.engine.run_cleanup();
    assert_eq!(report.counts.blocked_subnets, 1);
    assert_eq!(report.counts.blocked, 3);
}

#[tokio::test]
async fn test_reblocked_address_cannot_breach_subnet_alone() {
    let mut t = TestEngine::start(EngineConfig {
        block_after_new_connections: 1,
        ipv6_subnet_group_depth: 1,
        ipv6_subnet_breach_factor: 2,
        ..EngineConfig::default()
    });
    let addr = ip("2001:db8::1");

    assert!(!t.engine.test_address_allowed(addr));
    t.engine.apply_auth_event(AuthEvent::ValidLogin, addr);
    t.engine.apply_auth_event(AuthEvent::Logout, addr);
    assert!(!t.engine.test_address_allowed(addr));

    assert!(t.drain_notifications().is_empty());
    t.engine.settle().await;
    let wide: Ipv6Net = "2001:db8::/112".parse().unwrap();
    assert!(!t.enforcer.is_subnet_blocked(&wide));

    // a second distinct address reaches the threshold of 2
    assert!(!t.engine.test_address_allowed(ip("2001:db8::2")));
    let notifications = t.drain_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::SubnetBlocked);
}

#[tokio::test]
async fn test_ipv4_blocks_never_touch_subnets() {
    let t = TestEngine::start(EngineConfig {
        block_after_new_connections: 1,
        ..EngineConfig::default()
    });
    for last in 1..=50u8 {
        t.engine.test_address_allowed(IpAddr::from([10, 0, 0, last]));
    }
    assert_eq!(t.engine.stats().subnet_groups, 0);
}

#[tokio::test]
async fn test_fresh_records_survive_cleanup() {
    let t = TestEngine::start(EngineConfig::default());
    let addr = ip("192.0.2.30");
    t.engine.test_address_allowed(addr);

    let report = t.engine.run_cleanup();
    assert_eq!(report.expired_records, 0);
    assert_eq!(t.engine.address_details(addr).unauthed_new_connections, 1);
    assert_eq!(t.engine.stats().last_cleanup.total, 1);
}
