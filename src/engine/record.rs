//! Per-address behavioral records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;

/// Behavioral and authentication state for one source address.
///
/// `warn` and `blocked` only move back to `false` through a valid login or
/// expiry of the whole record. Counters are only ever reset by expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRecord {
    pub address: IpAddr,
    pub authenticated: bool,
    pub warn: bool,
    pub blocked: bool,
    pub last_access_at: Option<DateTime<Utc>>,
    pub original_access_at: Option<DateTime<Utc>>,
    pub last_auth_at: Option<DateTime<Utc>>,
    /// Admission checks while unauthenticated.
    pub unauthed_new_connections: u64,
    /// Invalid logins while unauthenticated.
    pub unauthed_attempts: u64,
    /// Invalid logins while authenticated.
    pub absurd_auth_attempts: u64,
}

impl AddressRecord {
    /// The zero-value record reported for an address that is not tracked.
    pub fn unseen(address: IpAddr) -> Self {
        Self {
            address,
            authenticated: false,
            warn: false,
            blocked: false,
            last_access_at: None,
            original_access_at: None,
            last_auth_at: None,
            unauthed_new_connections: 0,
            unauthed_attempts: 0,
            absurd_auth_attempts: 0,
        }
    }

    pub(crate) fn new(address: IpAddr, now: DateTime<Utc>) -> Self {
        Self {
            original_access_at: Some(now),
            ..Self::unseen(address)
        }
    }

    /// Whole seconds since the record was created.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        self.original_access_at
            .map_or(i64::MAX, |created| (now - created).num_seconds())
    }
}

/// Address records keyed by address. At most one record per address.
#[derive(Debug, Default)]
pub(crate) struct RecordStore {
    records: HashMap<IpAddr, AddressRecord>,
}

impl RecordStore {
    pub(crate) fn get(&self, addr: &IpAddr) -> Option<&AddressRecord> {
        self.records.get(addr)
    }

    /// Look up the record for `addr`, creating it on first reference.
    pub(crate) fn get_or_create(&mut self, addr: IpAddr, now: DateTime<Utc>) -> &mut AddressRecord {
        self.records
            .entry(addr)
            .or_insert_with(|| AddressRecord::new(addr, now))
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&IpAddr, &mut AddressRecord) -> bool) {
        self.records.retain(keep);
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &AddressRecord> {
        self.records.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}
