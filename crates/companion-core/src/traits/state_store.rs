// # State Store Trait
//
// Durable mapping from hostname to the record last applied for it.
//
// ## Purpose
//
// The store is the engine's memory across restarts: the startup
// reconciliation pass reads it to find every record this process created and
// heals any drift against the provider.
//
// ## Implementations
//
// - `FileStateStore`: JSON document, atomic rewrite on every mutation
// - `MemoryStateStore`: no persistence (persistence disabled, tests)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::Result;

/// A record the companion has applied
///
/// The legacy field names `domain`, `subdomain` and `ip` are accepted when
/// reading older state files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// Fully qualified hostname (the key)
    pub hostname: String,
    /// Zone the record lives in
    #[serde(alias = "domain")]
    pub zone: String,
    /// Label relative to the zone
    #[serde(alias = "subdomain")]
    pub label: String,
    /// Address written to the provider
    #[serde(alias = "ip")]
    pub target: IpAddr,
    /// Record type
    pub record_type: String,
    /// When the entry was last written
    pub last_updated: DateTime<Utc>,
}

impl PersistedEntry {
    /// Build an entry stamped with the current time
    pub(crate) fn new(
        hostname: &str,
        zone: &str,
        label: &str,
        target: IpAddr,
        record_type: &str,
    ) -> Self {
        Self {
            hostname: hostname.to_string(),
            zone: zone.to_string(),
            label: label.to_string(),
            target,
            record_type: record_type.to_string(),
            last_updated: Utc::now(),
        }
    }
}

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently. Reads may run in parallel
/// with each other but never with a write.
///
/// # Copies
///
/// Accessors return owned copies; callers cannot mutate store state except
/// through [`StateStore::update`] and [`StateStore::remove`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert or overwrite the entry for `hostname` and persist
    ///
    /// # Parameters
    ///
    /// - `hostname`: the key
    /// - `zone`, `label`, `target`, `record_type`: the applied record
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the entry is durable
    /// - `Err(Error)`: persisting failed; the in-memory view holds the entry
    async fn update(
        &self,
        hostname: &str,
        zone: &str,
        label: &str,
        target: IpAddr,
        record_type: &str,
    ) -> Result<()>;

    /// Delete the entry for `hostname` (if any) and persist
    async fn remove(&self, hostname: &str) -> Result<()>;

    /// Entry for `hostname`
    async fn get(&self, hostname: &str) -> Option<PersistedEntry>;

    /// Copy of every entry, keyed by hostname
    async fn get_all(&self) -> HashMap<String, PersistedEntry>;

    /// Whether any entry exists
    async fn has_any(&self) -> bool;

    /// Number of entries
    async fn count(&self) -> usize;
}
