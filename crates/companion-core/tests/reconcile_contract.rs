//! Contract Test: Batch Reconciliation
//!
//! Constraints verified:
//! - An empty store is a no-op (no session opened)
//! - One login per pass, one record read per zone
//! - Entries are compared against the currently resolved address
//! - Failures are isolated per entry and per zone
//! - Cancellation is honoured before each zone read and between entries
//! - Reconciled hosts are not processed again by later facts

mod common;

use common::*;
use companion_core::traits::{NoopNotifier, StateStore, StaticAddress};
use companion_core::{FactOutcome, HostFact, MemoryStateStore, ReconcileEngine, ReconcileReport};
use tokio::sync::watch;

fn engine_at(api: &MockDnsApi, store: &MemoryStateStore, current: &str) -> ReconcileEngine {
    let (engine, _events) = ReconcileEngine::new(
        Box::new(MockDnsApi::sharing_counters_with(api)),
        Box::new(store.clone()),
        Box::new(StaticAddress(ip(current))),
        Box::new(NoopNotifier),
        &test_config(false),
    )
    .unwrap();
    engine
}

#[tokio::test]
async fn empty_store_is_a_no_op() {
    let api = MockDnsApi::new();
    let engine = engine_at(&api, &MemoryStateStore::new(), "203.0.113.5");
    let (_tx, cancel) = watch::channel(false);

    let report = engine.reconcile(&cancel).await.unwrap();

    assert_eq!(report, ReconcileReport::default());
    assert_eq!(api.login_calls(), 0);
}

#[tokio::test]
async fn heals_drift_after_address_change() {
    // Every entry was written at .7; the host now lives at .5.
    let api = MockDnsApi::new()
        .with_zone("example.com", &[("app", "198.51.100.7"), ("api", "203.0.113.5")])
        .with_zone("example.org", &[]);
    let store = MemoryStateStore::with_entries([
        entry("app.example.com", "198.51.100.7"),
        entry("api.example.com", "198.51.100.7"),
        entry("www.example.org", "198.51.100.7"),
    ]);
    let engine = engine_at(&api, &store, "203.0.113.5");
    let (_tx, cancel) = watch::channel(false);

    let report = engine.reconcile(&cancel).await.unwrap();

    assert_eq!(report.synced, 2, "app updated, www recreated");
    assert_eq!(report.in_sync, 1, "api already at the current address");
    assert_eq!(report.errors, 0);
    assert!(!report.cancelled);

    assert_eq!(api.login_calls(), 1);
    assert_eq!(api.logout_calls(), 1);
    assert_eq!(api.query_records_calls(), 2, "one read per zone");

    assert_eq!(api.target_of("example.com", "app").as_deref(), Some("203.0.113.5"));
    assert_eq!(api.target_of("example.org", "www").as_deref(), Some("203.0.113.5"));
    assert_eq!(store.get("app.example.com").await.unwrap().target, ip("203.0.113.5"));
    assert_eq!(store.get("www.example.org").await.unwrap().target, ip("203.0.113.5"));
}

#[tokio::test]
async fn failures_are_isolated_per_entry_and_zone() {
    let api = MockDnsApi::new()
        .with_zone("example.com", &[])
        .with_zone("broken.net", &[]);
    api.fail_label("bad");
    api.fail_zone("broken.net");

    let store = MemoryStateStore::with_entries([
        entry("bad.example.com", "198.51.100.7"),
        entry("good.example.com", "198.51.100.7"),
        entry("a.broken.net", "198.51.100.7"),
        entry("b.broken.net", "198.51.100.7"),
    ]);
    let engine = engine_at(&api, &store, "203.0.113.5");
    let (_tx, cancel) = watch::channel(false);

    let report = engine.reconcile(&cancel).await.unwrap();

    assert_eq!(report.synced, 1);
    assert_eq!(report.errors, 3);
    assert_eq!(report.total(), 4);
    assert_eq!(api.target_of("example.com", "good").as_deref(), Some("203.0.113.5"));
    assert!(!engine.is_known("bad.example.com").await);
    assert!(engine.is_known("good.example.com").await);
}

#[tokio::test]
async fn cancellation_stops_before_next_entry() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    let store = MemoryStateStore::with_entries([
        entry("a.example.com", "198.51.100.7"),
        entry("b.example.com", "198.51.100.7"),
    ]);
    let engine = engine_at(&api, &store, "203.0.113.5");
    let (cancel_tx, cancel) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let report = engine.reconcile(&cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.total(), 0);
    assert_eq!(api.upsert_calls(), 0);
    assert_eq!(api.logout_calls(), 1, "session closed on cancellation");
}

#[tokio::test]
async fn cancellation_skips_remaining_zone_reads() {
    let api = MockDnsApi::new()
        .with_zone("example.com", &[])
        .with_zone("example.net", &[])
        .with_zone("example.org", &[]);
    let store = MemoryStateStore::with_entries([
        entry("a.example.com", "198.51.100.7"),
        entry("b.example.net", "198.51.100.7"),
        entry("c.example.org", "198.51.100.7"),
    ]);
    let engine = engine_at(&api, &store, "203.0.113.5");
    let (cancel_tx, cancel) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let report = engine.reconcile(&cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(api.query_records_calls(), 0, "no zone read after cancellation");
    assert_eq!(api.login_calls(), 1);
    assert_eq!(api.logout_calls(), 1);
}

#[tokio::test]
async fn reconciled_hosts_are_known_to_fact_processing() {
    let api = MockDnsApi::new().with_zone("example.com", &[("app", "198.51.100.7")]);
    let store = MemoryStateStore::with_entries([entry("app.example.com", "198.51.100.7")]);
    let engine = engine_at(&api, &store, "203.0.113.5");
    let (_tx, cancel) = watch::channel(false);

    engine.reconcile(&cancel).await.unwrap();
    let outcome = engine
        .process_fact(&HostFact::new("app.example.com"))
        .await
        .unwrap();

    assert_eq!(outcome, FactOutcome::AlreadyKnown);
    assert_eq!(api.upsert_calls(), 1);
}
