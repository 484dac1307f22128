//! Mock DNS backend for E2E tests
//!
//! Implements [`DnsBackend`] over an in-memory record table so the engine
//! can be exercised without a provider API. Every session operation is
//! counted, and failures can be switched on per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use dnsproof::{
    BackendError, BackendResult, BackendSession, DnsBackend, Fqdn, RecordReference, TxtRecord,
    ZoneApex, ZoneResolver,
};

pub const NAME: &str = "mock";

/// A record held by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub name: Fqdn,
    pub value: String,
    pub ttl: u32,
    /// Zone the record was created under; `None` for a flat backend
    pub zone: Option<Fqdn>,
}

#[derive(Debug, Default)]
struct MockState {
    zones: Vec<ZoneApex>,
    /// reference -> record
    records: DashMap<String, StoredRecord>,
    record_counter: AtomicU64,
    opens: AtomicU64,
    closes: AtomicU64,
    zone_listings: AtomicU64,
    creates: AtomicU64,
    deletes: AtomicU64,
    fail_open: AtomicBool,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    /// Scheduler yields inserted before creating a record with this name
    create_yields: Mutex<HashMap<String, u32>>,
}

/// In-memory DNS backend
#[derive(Debug)]
pub struct MockBackend {
    state: Arc<MockState>,
    resolver: ZoneResolver,
    min_ttl: u32,
}

impl MockBackend {
    /// Backend that enumerates `zones` and picks the longest suffix
    pub fn enumerating(zones: &[&str]) -> Self {
        let zones = zones
            .iter()
            .enumerate()
            .map(|(i, name)| ZoneApex::new(name, Some(format!("mock-zone-{}", i))))
            .collect();
        Self::with_resolver(zones, ZoneResolver::Enumerate)
    }

    /// Backend pinned to a single zone
    pub fn pinned(zone: &str) -> Self {
        let apex = ZoneApex::new(zone, Some("mock-zone-pinned".to_string()));
        Self::with_resolver(vec![apex.clone()], ZoneResolver::Explicit(apex))
    }

    /// Backend that takes full record names without a zone
    pub fn flat() -> Self {
        Self::with_resolver(Vec::new(), ZoneResolver::Flat)
    }

    fn with_resolver(zones: Vec<ZoneApex>, resolver: ZoneResolver) -> Self {
        Self {
            state: Arc::new(MockState {
                zones,
                record_counter: AtomicU64::new(1),
                ..Default::default()
            }),
            resolver,
            min_ttl: 1,
        }
    }

    pub fn with_min_ttl(mut self, min_ttl: u32) -> Self {
        self.min_ttl = min_ttl;
        self
    }

    /// Yield to the scheduler `count` times before creating a record named `name`
    pub fn set_create_yields(&self, name: &str, count: u32) {
        self.state
            .create_yields
            .lock()
            .insert(Fqdn::new(name).as_absolute().to_string(), count);
    }

    /// Make `open` fail with an authentication error
    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.state.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Delete every record named `name` behind the engine's back
    pub fn remove_out_of_band(&self, name: &str) -> usize {
        let name = Fqdn::new(name);
        let before = self.state.records.len();
        self.state.records.retain(|_, record| record.name != name);
        before - self.state.records.len()
    }

    /// Whether a record with this name and value exists
    pub fn has_record(&self, name: &str, value: &str) -> bool {
        let name = Fqdn::new(name);
        self.state
            .records
            .iter()
            .any(|r| r.name == name && r.value == value)
    }

    /// All records with this name
    pub fn records_named(&self, name: &str) -> Vec<StoredRecord> {
        let name = Fqdn::new(name);
        self.state
            .records
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.state.records.len()
    }

    pub fn opens(&self) -> u64 {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn zone_listings(&self) -> u64 {
        self.state.zone_listings.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> u64 {
        self.state.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u64 {
        self.state.deletes.load(Ordering::SeqCst)
    }

    /// Total backend calls of any kind
    pub fn calls(&self) -> u64 {
        self.opens() + self.zone_listings() + self.creates() + self.deletes()
    }
}

#[async_trait]
impl DnsBackend for MockBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_ttl(&self) -> u32 {
        self.min_ttl
    }

    fn zone_resolver(&self) -> &ZoneResolver {
        &self.resolver
    }

    async fn open(&self) -> BackendResult<Box<dyn BackendSession>> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::Authentication(
                "simulated credential rejection".into(),
            ));
        }

        Ok(Box::new(MockSession {
            state: self.state.clone(),
            flat: matches!(self.resolver, ZoneResolver::Flat),
            closed: false,
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
    flat: bool,
    closed: bool,
}

impl MockSession {
    fn check_zone(&self, zone: Option<&ZoneApex>, name: &Fqdn) -> BackendResult<Option<Fqdn>> {
        match (zone, self.flat) {
            (None, true) => Ok(None),
            (Some(zone), false) if name.is_within(&zone.name) => Ok(Some(zone.name.clone())),
            (Some(zone), false) => Err(BackendError::Api(format!(
                "{} is outside zone {}",
                name, zone.name
            ))),
            (_, true) => Err(BackendError::Api("flat backend received a zone".into())),
            (None, false) => Err(BackendError::Api("zone required".into())),
        }
    }
}

#[async_trait]
impl BackendSession for MockSession {
    async fn list_zones(&mut self) -> BackendResult<Vec<ZoneApex>> {
        self.state.zone_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.zones.clone())
    }

    async fn create_record(
        &mut self,
        zone: Option<&ZoneApex>,
        record: &TxtRecord,
    ) -> BackendResult<RecordReference> {
        self.state.creates.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Api("simulated create failure".into()));
        }
        let zone = self.check_zone(zone, &record.name)?;

        let yields = self
            .state
            .create_yields
            .lock()
            .get(record.name.as_absolute())
            .copied()
            .unwrap_or(0);
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }

        let reference = format!(
            "mock-record-{}",
            self.state.record_counter.fetch_add(1, Ordering::Relaxed)
        );
        self.state.records.insert(
            reference.clone(),
            StoredRecord {
                name: record.name.clone(),
                value: record.value.clone(),
                ttl: record.ttl,
                zone,
            },
        );
        tracing::debug!("MockBackend: created {} for {}", reference, record.name);
        Ok(RecordReference::new(reference))
    }

    async fn delete_record(
        &mut self,
        _zone: Option<&ZoneApex>,
        reference: &RecordReference,
    ) -> BackendResult<()> {
        self.state.deletes.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_delete.load(Ordering::SeqCst) {
            return Err(BackendError::Api("simulated delete failure".into()));
        }

        match self.state.records.remove(reference.as_str()) {
            Some(_) => {
                tracing::debug!("MockBackend: deleted {}", reference);
                Ok(())
            }
            None => Err(BackendError::RecordNotFound(reference.to_string())),
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, value: &str) -> TxtRecord {
        TxtRecord {
            name: Fqdn::new(name),
            value: value.to_string(),
            ttl: 120,
        }
    }

    #[tokio::test]
    async fn test_create_and_delete_record() {
        let backend = MockBackend::pinned("example.com");
        let zone = ZoneApex::new("example.com", Some("mock-zone-pinned".to_string()));

        let mut session = backend.open().await.unwrap();
        let reference = session
            .create_record(Some(&zone), &record("_acme-challenge.example.com", "v1"))
            .await
            .unwrap();
        assert!(reference.as_str().starts_with("mock-record-"));
        assert!(backend.has_record("_acme-challenge.example.com", "v1"));

        session.delete_record(Some(&zone), &reference).await.unwrap();
        assert_eq!(backend.record_count(), 0);

        let err = session
            .delete_record(Some(&zone), &reference)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::RecordNotFound(_)));

        session.close().await;
        session.close().await;
        assert_eq!(backend.opens(), 1);
        assert_eq!(backend.closes(), 1);
    }

    #[tokio::test]
    async fn test_failure_simulation() {
        let backend = MockBackend::flat();

        backend.set_fail_open(true);
        assert!(matches!(
            backend.open().await.err(),
            Some(BackendError::Authentication(_))
        ));
        backend.set_fail_open(false);

        let mut session = backend.open().await.unwrap();
        backend.set_fail_create(true);
        assert!(session
            .create_record(None, &record("_acme-challenge.example.com", "v"))
            .await
            .is_err());
        assert_eq!(backend.record_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_out_of_band() {
        let backend = MockBackend::flat();
        let mut session = backend.open().await.unwrap();
        session
            .create_record(None, &record("_acme-challenge.example.com", "a"))
            .await
            .unwrap();
        session
            .create_record(None, &record("_acme-challenge.example.org", "b"))
            .await
            .unwrap();

        assert_eq!(backend.remove_out_of_band("_acme-challenge.example.com"), 1);
        assert_eq!(backend.record_count(), 1);
        assert!(backend.has_record("_acme-challenge.example.org", "b"));
    }
}
