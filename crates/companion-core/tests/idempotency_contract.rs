//! Contract Test: Fact Processing & Idempotency
//!
//! Constraints verified:
//! - A hostname is written at most once per process lifetime
//! - Create/update/in-sync classification drives the single upsert
//! - Applied records are persisted; persistence failure is not an error
//! - Every successful login is paired with a logout, on every exit path
//! - A failed write leaves the hostname eligible for a later fact
//! - Only IPv4 targets are ever written into address records

mod common;

use common::*;
use companion_core::traits::{NoopNotifier, NotificationLevel, StaticAddress, StateStore};
use companion_core::{
    Error, FactOutcome, HostFact, MemoryStateStore, ReconcileEngine, SyncDecision,
};

fn engine_with(
    api: &MockDnsApi,
    store: &MemoryStateStore,
    notifier: &RecordingNotifier,
) -> ReconcileEngine {
    let (engine, _events) = ReconcileEngine::new(
        Box::new(MockDnsApi::sharing_counters_with(api)),
        Box::new(store.clone()),
        Box::new(StaticAddress(ip("203.0.113.5"))),
        Box::new(notifier.clone()),
        &test_config(false),
    )
    .expect("engine construction succeeds");
    engine
}

#[tokio::test]
async fn create_scenario_writes_once_and_persists() {
    let api = MockDnsApi::new().with_zone("example.com", &[("www", "203.0.113.5")]);
    let store = MemoryStateStore::new();
    let notifier = RecordingNotifier::default();
    let engine = engine_with(&api, &store, &notifier);

    let fact = HostFact::new("app.example.com").with_target(ip("203.0.113.5"));
    let outcome = engine.process_fact(&fact).await.unwrap();

    assert_eq!(
        outcome,
        FactOutcome::Applied {
            decision: SyncDecision::Create,
            target: ip("203.0.113.5"),
        }
    );

    let upserts = api.upserts();
    assert_eq!(upserts.len(), 1);
    let (zone, records) = &upserts[0];
    assert_eq!(zone, "example.com");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "app");
    assert_eq!(records[0].record_type, "A");
    assert_eq!(records[0].target, "203.0.113.5");

    let persisted = store.get("app.example.com").await.unwrap();
    assert_eq!(persisted.target, ip("203.0.113.5"));
    assert_eq!(persisted.zone, "example.com");
    assert_eq!(persisted.label, "app");

    assert!(engine.is_known("app.example.com").await);
    assert_eq!(notifier.count(NotificationLevel::Success), 1);
}

#[tokio::test]
async fn duplicate_fact_does_not_trigger_second_write() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    let store = MemoryStateStore::new();
    let engine = engine_with(&api, &store, &RecordingNotifier::default());

    let fact = HostFact::new("app.example.com");
    engine.process_fact(&fact).await.unwrap();
    let second = engine.process_fact(&fact).await.unwrap();

    assert_eq!(second, FactOutcome::AlreadyKnown);
    assert_eq!(api.upsert_calls(), 1);
    assert_eq!(api.login_calls(), 1, "known host must not open a session");
}

#[tokio::test]
async fn record_already_in_sync_is_not_written() {
    let api = MockDnsApi::new().with_zone("example.com", &[("app", "203.0.113.5")]);
    let store = MemoryStateStore::new();
    let engine = engine_with(&api, &store, &RecordingNotifier::default());

    let fact = HostFact::new("app.example.com").with_target(ip("203.0.113.5"));
    let first = engine.process_fact(&fact).await.unwrap();
    let second = engine.process_fact(&fact).await.unwrap();

    assert_eq!(first, FactOutcome::InSync { target: ip("203.0.113.5") });
    assert_eq!(second, FactOutcome::AlreadyKnown);
    assert_eq!(api.upsert_calls(), 0);
    assert!(engine.is_known("app.example.com").await);
}

#[tokio::test]
async fn stale_record_is_updated_with_full_desired_state() {
    let api = MockDnsApi::new().with_zone("example.com", &[("app", "198.51.100.7")]);
    let store = MemoryStateStore::new();
    let notifier = RecordingNotifier::default();
    let engine = engine_with(&api, &store, &notifier);

    let outcome = engine
        .process_fact(&HostFact::new("app.example.com"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        FactOutcome::Applied {
            decision: SyncDecision::Update {
                current: "198.51.100.7".to_string()
            },
            target: ip("203.0.113.5"),
        }
    );
    assert_eq!(api.target_of("example.com", "app").as_deref(), Some("203.0.113.5"));
    assert!(notifier.messages()[0].1.contains("198.51.100.7 -> 203.0.113.5"));
}

#[tokio::test]
async fn failed_upsert_leaves_host_unmarked_for_retry() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    api.fail_label("app");
    let store = MemoryStateStore::new();
    let notifier = RecordingNotifier::default();
    let engine = engine_with(&api, &store, &notifier);

    let fact = HostFact::new("app.example.com");
    assert!(engine.process_fact(&fact).await.is_err());
    assert!(!engine.is_known("app.example.com").await);
    assert!(store.get("app.example.com").await.is_none());
    assert_eq!(notifier.count(NotificationLevel::Error), 1);

    api.heal_label("app");
    let outcome = engine.process_fact(&fact).await.unwrap();
    assert!(matches!(outcome, FactOutcome::Applied { .. }));
    assert_eq!(api.upsert_calls(), 2);
}

#[tokio::test]
async fn every_login_is_paired_with_a_logout() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    api.fail_label("broken");
    let engine = engine_with(&api, &MemoryStateStore::new(), &RecordingNotifier::default());

    // success, unknown zone, upsert failure
    engine.process_fact(&HostFact::new("ok.example.com")).await.unwrap();
    assert!(engine.process_fact(&HostFact::new("app.missing.org")).await.is_err());
    assert!(engine.process_fact(&HostFact::new("broken.example.com")).await.is_err());

    assert_eq!(api.login_calls(), 3);
    assert_eq!(api.logout_calls(), 3);
}

#[tokio::test]
async fn failed_login_has_nothing_to_log_out() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    api.fail_login();
    let engine = engine_with(&api, &MemoryStateStore::new(), &RecordingNotifier::default());

    assert!(engine.process_fact(&HostFact::new("app.example.com")).await.is_err());
    assert_eq!(api.logout_calls(), 0);
    assert!(!engine.is_known("app.example.com").await);
}

#[tokio::test]
async fn persistence_failure_does_not_fail_the_write() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    let (engine, _events) = ReconcileEngine::new(
        Box::new(MockDnsApi::sharing_counters_with(&api)),
        Box::new(FailingStateStore::default()),
        Box::new(StaticAddress(ip("203.0.113.5"))),
        Box::new(NoopNotifier),
        &test_config(false),
    )
    .unwrap();

    let outcome = engine
        .process_fact(&HostFact::new("app.example.com"))
        .await
        .unwrap();

    assert!(matches!(outcome, FactOutcome::Applied { .. }));
    assert!(engine.is_known("app.example.com").await);
}

#[tokio::test]
async fn configured_override_takes_precedence_over_discovery() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    let resolver = CountingResolver::new(ip("198.51.100.1"));
    let mut config = test_config(false);
    config.engine.host_ip = Some(ip("203.0.113.77"));

    let (engine, _events) = ReconcileEngine::new(
        Box::new(MockDnsApi::sharing_counters_with(&api)),
        Box::new(MemoryStateStore::new()),
        Box::new(CountingResolver::sharing_counters_with(&resolver)),
        Box::new(NoopNotifier),
        &config,
    )
    .unwrap();

    engine.process_fact(&HostFact::new("a.example.com")).await.unwrap();
    engine
        .process_fact(&HostFact::new("b.example.com").with_target(ip("192.0.2.9")))
        .await
        .unwrap();

    assert_eq!(resolver.calls(), 0);
    assert_eq!(api.target_of("example.com", "a").as_deref(), Some("203.0.113.77"));
    assert_eq!(api.target_of("example.com", "b").as_deref(), Some("192.0.2.9"));
}

#[tokio::test]
async fn discovery_is_used_without_override() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    let resolver = CountingResolver::new(ip("198.51.100.1"));

    let (engine, _events) = ReconcileEngine::new(
        Box::new(MockDnsApi::sharing_counters_with(&api)),
        Box::new(MemoryStateStore::new()),
        Box::new(CountingResolver::sharing_counters_with(&resolver)),
        Box::new(NoopNotifier),
        &test_config(false),
    )
    .unwrap();

    engine.process_fact(&HostFact::new("example.com")).await.unwrap();

    assert_eq!(resolver.calls(), 1);
    assert_eq!(api.target_of("example.com", "@").as_deref(), Some("198.51.100.1"));
}

#[tokio::test]
async fn ipv6_target_is_rejected_without_writing() {
    let api = MockDnsApi::new().with_zone("example.com", &[]);
    let (engine, _events) = ReconcileEngine::new(
        Box::new(MockDnsApi::sharing_counters_with(&api)),
        Box::new(MemoryStateStore::new()),
        Box::new(StaticAddress(ip("2001:db8::1"))),
        Box::new(NoopNotifier),
        &test_config(false),
    )
    .unwrap();

    let discovered = engine.process_fact(&HostFact::new("app.example.com")).await;
    assert!(matches!(discovered, Err(Error::InvalidInput(_))));

    let overridden = engine
        .process_fact(&HostFact::new("api.example.com").with_target(ip("2001:db8::2")))
        .await;
    assert!(matches!(overridden, Err(Error::InvalidInput(_))));

    assert_eq!(api.login_calls(), 0);
    assert_eq!(api.upsert_calls(), 0);
    assert!(!engine.is_known("app.example.com").await);
    assert!(!engine.is_known("api.example.com").await);
}
