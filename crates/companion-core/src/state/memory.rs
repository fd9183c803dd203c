// # Memory State Store
//
// In-memory implementation of StateStore.
//
// Used when state persistence is disabled. Everything is lost on restart,
// so the startup reconciliation pass has nothing to heal and every host is
// handled fresh from its fact.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::traits::state_store::{PersistedEntry, StateStore};
use crate::Error;

/// In-memory state store
///
/// Clones share the same map, which lets tests keep a handle on a store
/// after handing it to the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<String, PersistedEntry>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`
    pub fn with_entries(entries: impl IntoIterator<Item = PersistedEntry>) -> Self {
        let map = entries
            .into_iter()
            .map(|entry| (entry.hostname.clone(), entry))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn update(
        &self,
        hostname: &str,
        zone: &str,
        label: &str,
        target: IpAddr,
        record_type: &str,
    ) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(
            hostname.to_string(),
            PersistedEntry::new(hostname, zone, label, target, record_type),
        );
        Ok(())
    }

    async fn remove(&self, hostname: &str) -> Result<(), Error> {
        self.inner.write().await.remove(hostname);
        Ok(())
    }

    async fn get(&self, hostname: &str) -> Option<PersistedEntry> {
        self.inner.read().await.get(hostname).cloned()
    }

    async fn get_all(&self) -> HashMap<String, PersistedEntry> {
        self.inner.read().await.clone()
    }

    async fn has_any(&self) -> bool {
        !self.inner.read().await.is_empty()
    }

    async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}
