//! Reconciliation engine
//!
//! The [`ReconcileEngine`] turns desired-state facts into the minimum set of
//! remote writes and keeps the persisted record of what it applied.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ FactSource  │─── HostFact ───┐
//! └─────────────┘                │  bounded work queue
//!                                ▼
//!                     ┌─────────────────┐
//!                     │ ReconcileEngine │
//!                     └─────────────────┘
//!                                │
//!      ┌─────────────────┬───────┴─────────┬─────────────────┐
//!      ▼                 ▼                 ▼                 ▼
//! ┌──────────┐    ┌────────────┐    ┌────────────┐    ┌────────────┐
//! │ Address  │    │ DnsApi     │    │ StateStore │    │ Notifier / │
//! │ Resolver │    │ (session)  │    │ (persist)  │    │ Events     │
//! └──────────┘    └────────────┘    └────────────┘    └────────────┘
//! ```
//!
//! ## Fact Flow
//!
//! 1. Skip the hostname if it was already handled in this process
//! 2. Resolve the target address (fact override, configured override, resolver)
//! 3. Log in, check the zone, read its records
//! 4. Classify: in sync, create, or update
//! 5. Upsert the full desired record unless in sync or dry-run
//! 6. Persist, mark the hostname known, log out
//!
//! ## Mutual Exclusion
//!
//! One lock guards the known-hosts set and is held for the whole of a
//! `process_fact` or `reconcile` call, so at most one of them talks to the
//! provider at any time.

mod session;

pub use session::ScopedSession;

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

use tokio::sync::{Mutex, mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::CompanionConfig;
use crate::error::{Error, Result};
use crate::record::{DnsRecord, HostFact, RECORD_TYPE_A, SyncDecision};
use crate::traits::{
    AddressResolver, DnsApi, FactSource, FactStream, Notifier, PersistedEntry, StateStore,
};

/// Result of processing one fact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactOutcome {
    /// The hostname was already handled in this process
    AlreadyKnown,
    /// The remote record already points at the target
    InSync { target: IpAddr },
    /// A remote record was created or updated
    Applied { decision: SyncDecision, target: IpAddr },
    /// A write was needed but dry-run suppressed it
    DryRun { decision: SyncDecision, target: IpAddr },
}

/// Counters of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries written to the provider
    pub synced: usize,
    /// Entries already correct remotely (dry-run decisions included)
    pub in_sync: usize,
    /// Entries that failed
    pub errors: usize,
    /// The pass stopped early on cancellation
    pub cancelled: bool,
}

impl ReconcileReport {
    /// Entries examined
    pub fn total(&self) -> usize {
        self.synced + self.in_sync + self.errors
    }
}

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Run loop started
    Started,

    /// A reconciliation pass finished
    ReconcileCompleted(ReconcileReport),

    /// A fact was handled
    FactProcessed {
        hostname: String,
        outcome: FactOutcome,
    },

    /// A fact failed
    FactFailed { hostname: String, error: String },

    /// Run loop stopped
    Stopped { reason: String },
}

/// The reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Either call [`process_fact`](Self::process_fact) /
///    [`reconcile`](Self::reconcile) directly, or hand a [`FactSource`] to
///    [`run`](Self::run)
/// 3. `run` returns once the shutdown signal is set or the source ends
pub struct ReconcileEngine {
    /// DNS management service
    api: Box<dyn DnsApi>,

    /// Applied-record bookkeeping
    state_store: Box<dyn StateStore>,

    /// Address discovery
    resolver: Box<dyn AddressResolver>,

    /// Operational messages
    notifier: Box<dyn Notifier>,

    /// Configured address override
    host_ip: Option<IpAddr>,

    /// Compute decisions without writing
    dry_run: bool,

    /// Reconcile before serving facts in `run`
    reconcile_on_startup: bool,

    /// Capacity of the live fact queue
    work_queue_capacity: usize,

    /// Hostnames handled in this process lifetime
    known_hosts: Mutex<HashSet<String>>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `api`: DNS management service
    /// - `state_store`: state store implementation
    /// - `resolver`: address discovery, consulted when no override applies
    /// - `notifier`: sink for operational messages
    /// - `config`: companion configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        api: Box<dyn DnsApi>,
        state_store: Box<dyn StateStore>,
        resolver: Box<dyn AddressResolver>,
        notifier: Box<dyn Notifier>,
        config: &CompanionConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.work_queue_capacity);

        let engine = Self {
            api,
            state_store,
            resolver,
            notifier,
            host_ip: config.engine.host_ip,
            dry_run: config.engine.dry_run,
            reconcile_on_startup: config.state.reconcile_on_startup,
            work_queue_capacity: config.engine.work_queue_capacity,
            known_hosts: Mutex::new(HashSet::new()),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Whether `hostname` was handled in this process lifetime
    pub async fn is_known(&self, hostname: &str) -> bool {
        self.known_hosts.lock().await.contains(hostname)
    }

    /// Number of hostnames handled in this process lifetime
    pub async fn known_count(&self) -> usize {
        self.known_hosts.lock().await.len()
    }

    /// Bring the remote record for one fact in line with it
    ///
    /// A repeated hostname is a no-op. The hostname is marked known when the
    /// record is in sync, was written, or a dry-run decision was reported;
    /// a failed write leaves it unmarked so a later fact retries.
    pub async fn process_fact(&self, fact: &HostFact) -> Result<FactOutcome> {
        let mut known = self.known_hosts.lock().await;
        if known.contains(&fact.hostname) {
            debug!(hostname = %fact.hostname, "Host already handled, skipping");
            return Ok(FactOutcome::AlreadyKnown);
        }

        let target = self.resolve_target(fact.target).await.map_err(|e| {
            self.report_failure(&fact.hostname, "resolve address", &e);
            e
        })?;

        let mut session = ScopedSession::open(self.api.as_ref()).await.map_err(|e| {
            self.report_failure(&fact.hostname, "login", &e);
            e
        })?;
        let result = self.apply_fact(&mut session, fact, target).await;
        session.close().await;

        let outcome = result?;
        known.insert(fact.hostname.clone());
        Ok(outcome)
    }

    async fn apply_fact(
        &self,
        session: &mut ScopedSession,
        fact: &HostFact,
        target: IpAddr,
    ) -> Result<FactOutcome> {
        let hostname = fact.hostname.as_str();

        session.query_zone(&fact.zone).await.map_err(|e| {
            self.report_failure(hostname, "query zone", &e);
            e
        })?;

        let records = session.query_records(&fact.zone).await.map_err(|e| {
            self.report_failure(hostname, "query records", &e);
            e
        })?;

        let decision = SyncDecision::classify(&records, &fact.label, target);
        if decision == SyncDecision::InSync {
            info!(hostname, %target, "DNS record already in sync");
            return Ok(FactOutcome::InSync { target });
        }

        if self.dry_run {
            info!(hostname, %target, action = decision.action(), "Dry run, not writing");
            self.notifier.info(&format!(
                "[DRY RUN] Would {} DNS: {} -> {}",
                decision.action(),
                hostname,
                target
            ));
            return Ok(FactOutcome::DryRun { decision, target });
        }

        let desired = [DnsRecord::address(fact.label.as_str(), target)];
        session
            .upsert_records(&fact.zone, &desired)
            .await
            .map_err(|e| {
                self.report_failure(hostname, decision.action(), &e);
                e
            })?;

        self.persist(hostname, &fact.zone, &fact.label, target).await;

        match &decision {
            SyncDecision::Update { current } => {
                info!(hostname, zone = %fact.zone, previous = %current, %target, "Updated DNS record");
                self.notifier
                    .success(&format!("Updated DNS: {}: {} -> {}", hostname, current, target));
            }
            _ => {
                info!(hostname, zone = %fact.zone, %target, "Created DNS record");
                self.notifier
                    .success(&format!("Created DNS: {} -> {}", hostname, target));
            }
        }

        Ok(FactOutcome::Applied { decision, target })
    }

    /// Heal drift between every persisted entry and the provider
    ///
    /// Entries are compared against the currently resolved address, not the
    /// address stored with them. One login serves the whole pass and each
    /// zone is read once. A failing entry is counted and skipped.
    ///
    /// `cancel` is checked before each zone read and each entry; once it
    /// reads `true` the pass stops and the report is marked cancelled.
    pub async fn reconcile(&self, cancel: &watch::Receiver<bool>) -> Result<ReconcileReport> {
        let mut known = self.known_hosts.lock().await;

        if !self.state_store.has_any().await {
            debug!("No persisted records, nothing to reconcile");
            return Ok(ReconcileReport::default());
        }

        let entries = self.state_store.get_all().await;
        info!("Reconciling {} persisted records", entries.len());

        let target = self.resolve_target(None).await?;
        let mut session = ScopedSession::open(self.api.as_ref()).await?;
        let report = self
            .reconcile_entries(&mut session, entries.into_values(), target, &mut known, cancel)
            .await;
        session.close().await;

        info!(
            synced = report.synced,
            in_sync = report.in_sync,
            errors = report.errors,
            cancelled = report.cancelled,
            "Reconciliation complete"
        );
        self.emit_event(EngineEvent::ReconcileCompleted(report.clone()));
        Ok(report)
    }

    async fn reconcile_entries(
        &self,
        session: &mut ScopedSession,
        entries: impl Iterator<Item = PersistedEntry>,
        target: IpAddr,
        known: &mut HashSet<String>,
        cancel: &watch::Receiver<bool>,
    ) -> ReconcileReport {
        let mut by_zone: BTreeMap<String, Vec<PersistedEntry>> = BTreeMap::new();
        for entry in entries {
            by_zone.entry(entry.zone.clone()).or_default().push(entry);
        }

        let mut report = ReconcileReport::default();

        for (zone, mut zone_entries) in by_zone {
            if *cancel.borrow() {
                info!(%zone, "Reconciliation cancelled before reading zone");
                report.cancelled = true;
                return report;
            }

            zone_entries.sort_by(|a, b| a.hostname.cmp(&b.hostname));

            let records = match session.query_records(&zone).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(%zone, "Failed to read records, skipping {} entries: {}", zone_entries.len(), e);
                    report.errors += zone_entries.len();
                    continue;
                }
            };

            for entry in zone_entries {
                if *cancel.borrow() {
                    info!("Reconciliation cancelled");
                    report.cancelled = true;
                    return report;
                }

                let hostname = entry.hostname.as_str();
                let decision = SyncDecision::classify(&records, &entry.label, target);

                if decision == SyncDecision::InSync {
                    debug!(hostname, %target, "Record in sync");
                    known.insert(entry.hostname.clone());
                    report.in_sync += 1;
                    continue;
                }

                if self.dry_run {
                    info!(hostname, %target, action = decision.action(), "Dry run, not reconciling");
                    self.notifier.info(&format!(
                        "[DRY RUN] Would {} DNS: {} -> {}",
                        decision.action(),
                        hostname,
                        target
                    ));
                    known.insert(entry.hostname.clone());
                    report.in_sync += 1;
                    continue;
                }

                let desired = [DnsRecord::address(entry.label.as_str(), target)];
                match session.upsert_records(&zone, &desired).await {
                    Ok(_) => {
                        self.persist(hostname, &zone, &entry.label, target).await;
                        known.insert(entry.hostname.clone());
                        report.synced += 1;
                        info!(hostname, %target, action = decision.action(), "Reconciled DNS record");
                        self.notifier
                            .success(&format!("Reconciled DNS: {} -> {}", hostname, target));
                    }
                    Err(e) => {
                        self.report_failure(hostname, decision.action(), &e);
                        report.errors += 1;
                    }
                }
            }
        }

        report
    }

    /// Serve facts from `source` until `shutdown` reads `true`
    ///
    /// Subscribes to live facts first so nothing observed during startup is
    /// lost, then runs the startup reconciliation (if enabled), processes
    /// the active facts, and finally drains live facts through a bounded
    /// queue.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: clean shutdown, or the source ended
    /// - `Err(Error)`: the live subscription could not be established
    pub async fn run(&self, source: &dyn FactSource, shutdown: watch::Receiver<bool>) -> Result<()> {
        let stream = source.watch()?;
        self.emit_event(EngineEvent::Started);

        if self.reconcile_on_startup {
            if let Err(e) = self.reconcile(&shutdown).await {
                warn!("Startup reconciliation failed: {}", e);
            }
        }

        match source.active_facts().await {
            Ok(facts) => {
                info!("Processing {} active facts", facts.len());
                for fact in facts {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.handle_fact(&fact).await;
                }
            }
            Err(e) => warn!("Failed to enumerate active facts: {}", e),
        }

        let (tx, rx) = mpsc::channel(self.work_queue_capacity);
        let (reason, ()) = tokio::join!(
            Self::feed(stream, tx, shutdown.clone()),
            self.drain(rx, shutdown.clone())
        );

        info!("Engine stopped: {}", reason);
        self.emit_event(EngineEvent::Stopped { reason });
        Ok(())
    }

    /// Move live facts into the work queue until shutdown or end of stream
    async fn feed(
        mut stream: FactStream,
        tx: mpsc::Sender<HostFact>,
        mut shutdown: watch::Receiver<bool>,
    ) -> String {
        loop {
            if *shutdown.borrow() {
                return "shutdown signal".to_string();
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return "shutdown channel closed".to_string();
                    }
                }
                next = stream.next() => {
                    let Some(fact) = next else {
                        return "fact source ended".to_string();
                    };
                    tokio::select! {
                        sent = tx.send(fact) => {
                            if sent.is_err() {
                                return "work queue closed".to_string();
                            }
                        }
                        _ = shutdown.changed() => {
                            return "shutdown signal".to_string();
                        }
                    }
                }
            }
        }
    }

    /// Process queued facts one at a time
    async fn drain(&self, mut rx: mpsc::Receiver<HostFact>, shutdown: watch::Receiver<bool>) {
        while let Some(fact) = rx.recv().await {
            if *shutdown.borrow() {
                let mut discarded = 1;
                while rx.try_recv().is_ok() {
                    discarded += 1;
                }
                warn!("Shutdown requested, discarding {} queued facts", discarded);
                break;
            }
            self.handle_fact(&fact).await;
        }
    }

    /// Process a fact, logging instead of propagating failures
    async fn handle_fact(&self, fact: &HostFact) {
        match self.process_fact(fact).await {
            Ok(outcome) => self.emit_event(EngineEvent::FactProcessed {
                hostname: fact.hostname.clone(),
                outcome,
            }),
            Err(e) => {
                error!(hostname = %fact.hostname, zone = %fact.zone, "Failed to process fact: {}", e);
                self.emit_event(EngineEvent::FactFailed {
                    hostname: fact.hostname.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Fact override, then configured override, then discovery
    ///
    /// Records are always `A`, so an IPv6 result is rejected.
    async fn resolve_target(&self, fact_target: Option<IpAddr>) -> Result<IpAddr> {
        let ip = match fact_target.or(self.host_ip) {
            Some(ip) => ip,
            None => self.resolver.resolve().await.map_err(|e| {
                Error::Other(format!(
                    "address resolution via {} failed: {}",
                    self.resolver.name(),
                    e
                ))
            })?,
        };
        if !ip.is_ipv4() {
            return Err(Error::invalid_input(format!(
                "{} is not an IPv4 address, cannot write an {} record",
                ip, RECORD_TYPE_A
            )));
        }
        Ok(ip)
    }

    /// Record an applied write; failure is only a warning
    async fn persist(&self, hostname: &str, zone: &str, label: &str, target: IpAddr) {
        if let Err(e) = self
            .state_store
            .update(hostname, zone, label, target, RECORD_TYPE_A)
            .await
        {
            warn!(hostname, "DNS record applied but state not persisted: {}", e);
        }
    }

    fn report_failure(&self, hostname: &str, action: &str, err: &Error) {
        error!(hostname, action, provider = self.api.provider_name(), "DNS operation failed: {}", err);
        self.notifier
            .error(&format!("DNS {} failed for {}: {}", action, hostname, err));
    }

    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
