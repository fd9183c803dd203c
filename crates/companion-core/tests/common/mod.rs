//! Test doubles and common utilities for engine contract tests
//!
//! The mocks share their counters through `Arc`s, so a test can keep one
//! handle and give the engine another via `sharing_counters_with`.

#![allow(dead_code)]

use companion_core::config::CompanionConfig;
use companion_core::error::{Error, Result};
use companion_core::record::{DnsRecord, RECORD_TYPE_A, ZoneInfo};
use companion_core::traits::{
    AddressResolver, DnsApi, DnsSession, NotificationLevel, Notifier, PersistedEntry, StateStore,
};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Remote state and call counters behind a [`MockDnsApi`]
#[derive(Default)]
struct Backend {
    zones: Mutex<HashMap<String, Vec<DnsRecord>>>,
    login_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    query_records_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
    upserts: Mutex<Vec<(String, Vec<DnsRecord>)>>,
    fail_login: AtomicBool,
    failing_zones: Mutex<HashSet<String>>,
    failing_labels: Mutex<HashSet<String>>,
    latency_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Backend {
    /// Hold a record operation open for the configured latency, tracking overlap
    async fn simulate_latency(&self) {
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(active, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A mock DNS service holding zones in memory
pub struct MockDnsApi {
    backend: Arc<Backend>,
}

impl MockDnsApi {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(Backend::default()),
        }
    }

    /// Create a MockDnsApi that shares state and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            backend: Arc::clone(&other.backend),
        }
    }

    /// Declare a zone with the given address records
    pub fn with_zone(self, zone: &str, records: &[(&str, &str)]) -> Self {
        let records = records
            .iter()
            .enumerate()
            .map(|(i, (label, target))| DnsRecord {
                id: Some(format!("{}", i + 1)),
                label: label.to_string(),
                record_type: RECORD_TYPE_A.to_string(),
                priority: "0".to_string(),
                target: target.to_string(),
                delete: false,
                state: Some("yes".to_string()),
            })
            .collect();
        self.backend
            .zones
            .lock()
            .unwrap()
            .insert(zone.to_string(), records);
        self
    }

    /// Delay every record read and write
    pub fn with_latency(self, latency: Duration) -> Self {
        self.backend
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Make every login fail
    pub fn fail_login(&self) {
        self.backend.fail_login.store(true, Ordering::SeqCst);
    }

    /// Make record reads for `zone` fail
    pub fn fail_zone(&self, zone: &str) {
        self.backend.failing_zones.lock().unwrap().insert(zone.to_string());
    }

    /// Make upserts touching `label` fail
    pub fn fail_label(&self, label: &str) {
        self.backend.failing_labels.lock().unwrap().insert(label.to_string());
    }

    /// Let upserts touching `label` succeed again
    pub fn heal_label(&self, label: &str) {
        self.backend.failing_labels.lock().unwrap().remove(label);
    }

    pub fn login_calls(&self) -> usize {
        self.backend.login_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.backend.logout_calls.load(Ordering::SeqCst)
    }

    pub fn query_records_calls(&self) -> usize {
        self.backend.query_records_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.backend.upsert_calls.load(Ordering::SeqCst)
    }

    /// Highest number of record operations seen running at once
    pub fn max_concurrent_operations(&self) -> usize {
        self.backend.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every upsert received, in order
    pub fn upserts(&self) -> Vec<(String, Vec<DnsRecord>)> {
        self.backend.upserts.lock().unwrap().clone()
    }

    /// Current target of the address record for `label` in `zone`
    pub fn target_of(&self, zone: &str, label: &str) -> Option<String> {
        self.backend
            .zones
            .lock()
            .unwrap()
            .get(zone)
            .and_then(|records| records.iter().find(|r| r.is_address_for(label)))
            .map(|r| r.target.clone())
    }
}

#[async_trait::async_trait]
impl DnsApi for MockDnsApi {
    async fn login(&self) -> Result<Box<dyn DnsSession>> {
        self.backend.login_calls.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_login.load(Ordering::SeqCst) {
            return Err(Error::NonRetryable {
                source: Box::new(Error::auth("invalid credentials")),
            });
        }
        Ok(Box::new(MockSession {
            backend: Arc::clone(&self.backend),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

struct MockSession {
    backend: Arc<Backend>,
}

#[async_trait::async_trait]
impl DnsSession for MockSession {
    async fn query_zone(&mut self, zone: &str) -> Result<ZoneInfo> {
        if !self.backend.zones.lock().unwrap().contains_key(zone) {
            return Err(Error::not_found(format!("zone {}", zone)));
        }
        Ok(ZoneInfo {
            name: zone.to_string(),
            ttl: "86400".to_string(),
            ..ZoneInfo::default()
        })
    }

    async fn query_records(&mut self, zone: &str) -> Result<Vec<DnsRecord>> {
        self.backend.query_records_calls.fetch_add(1, Ordering::SeqCst);
        self.backend.simulate_latency().await;
        if self.backend.failing_zones.lock().unwrap().contains(zone) {
            return Err(Error::transport("connection reset"));
        }
        Ok(self
            .backend
            .zones
            .lock()
            .unwrap()
            .get(zone)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_records(&mut self, zone: &str, records: &[DnsRecord]) -> Result<Vec<DnsRecord>> {
        self.backend.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.backend.simulate_latency().await;
        self.backend
            .upserts
            .lock()
            .unwrap()
            .push((zone.to_string(), records.to_vec()));

        {
            let failing = self.backend.failing_labels.lock().unwrap();
            if records.iter().any(|r| failing.contains(&r.label)) {
                return Err(Error::Api {
                    action: "updateDnsRecords".to_string(),
                    status_code: 5029,
                    short_message: "Record update failed".to_string(),
                    long_message: String::new(),
                });
            }
        }

        let mut zones = self.backend.zones.lock().unwrap();
        let existing = zones.entry(zone.to_string()).or_default();
        for record in records {
            match existing.iter_mut().find(|r| r.is_address_for(&record.label)) {
                Some(current) => current.target = record.target.clone(),
                None => {
                    let mut created = record.clone();
                    created.id = Some(format!("{}", existing.len() + 1));
                    existing.push(created);
                }
            }
        }
        Ok(existing.clone())
    }

    async fn update_zone(&mut self, _zone: &str, info: &ZoneInfo) -> Result<ZoneInfo> {
        Ok(info.clone())
    }

    async fn logout(&mut self) -> Result<()> {
        self.backend.logout_calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::transport("logout is best-effort"))
    }
}

/// A state store whose writes always fail
#[derive(Default)]
pub struct FailingStateStore {
    entries: Mutex<HashMap<String, PersistedEntry>>,
}

#[async_trait::async_trait]
impl StateStore for FailingStateStore {
    async fn update(&self, _: &str, _: &str, _: &str, _: IpAddr, _: &str) -> Result<()> {
        Err(Error::state_store("disk full"))
    }

    async fn remove(&self, _hostname: &str) -> Result<()> {
        Err(Error::state_store("disk full"))
    }

    async fn get(&self, hostname: &str) -> Option<PersistedEntry> {
        self.entries.lock().unwrap().get(hostname).cloned()
    }

    async fn get_all(&self) -> HashMap<String, PersistedEntry> {
        self.entries.lock().unwrap().clone()
    }

    async fn has_any(&self) -> bool {
        !self.entries.lock().unwrap().is_empty()
    }

    async fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// An address resolver returning a fixed address and counting calls
pub struct CountingResolver {
    ip: IpAddr,
    calls: Arc<AtomicUsize>,
}

impl CountingResolver {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            ip: other.ip,
            calls: Arc::clone(&other.calls),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressResolver for CountingResolver {
    async fn resolve(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ip)
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// A notifier recording every message
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<(NotificationLevel, String)>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(NotificationLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self, level: NotificationLevel) -> usize {
        self.messages().iter().filter(|(l, _)| *l == level).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        self.messages.lock().unwrap().push((level, message.to_string()));
    }
}

/// Build a persisted entry as an earlier run would have written it
pub fn entry(hostname: &str, target: &str) -> PersistedEntry {
    let (zone, label) = companion_core::split_hostname(hostname);
    PersistedEntry {
        hostname: hostname.to_string(),
        zone,
        label,
        target: ip(target),
        record_type: RECORD_TYPE_A.to_string(),
        last_updated: chrono::Utc::now(),
    }
}

/// Configuration with fast defaults and no startup reconciliation
pub fn test_config(dry_run: bool) -> CompanionConfig {
    let mut config = CompanionConfig::default();
    config.engine.dry_run = dry_run;
    config.engine.work_queue_capacity = 16;
    config.state.enabled = false;
    config.state.reconcile_on_startup = false;
    config
}
