// # File State Store
//
// File-based implementation of StateStore.
//
// ## Durability
//
// Every mutation rewrites the whole document: serialize, write to a sibling
// `.tmp` file, fsync, then rename over the real path. A crash at any point
// leaves either the old or the new document, never a truncated one. If the
// rename fails the temp file is removed and the error is returned.
//
// ## Loading
//
// - Missing file: start empty
// - Unreadable or corrupt file: log a warning and start empty
//
// ## File Format
//
// ```json
// {
//   "version": 1,
//   "updated_at": "2026-01-09T12:00:00Z",
//   "records": {
//     "app.example.com": {
//       "hostname": "app.example.com",
//       "zone": "example.com",
//       "label": "app",
//       "target": "203.0.113.5",
//       "record_type": "A",
//       "last_updated": "2026-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{PersistedEntry, StateStore};

/// State file format version
const STATE_FILE_VERSION: u32 = 1;

/// JSON-file backed state store
///
/// # Example
///
/// ```rust,no_run
/// use companion_core::state::FileStateStore;
/// use companion_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::load("/data/dns-state.json").await?;
///
///     store
///         .update("app.example.com", "example.com", "app", "203.0.113.5".parse()?, "A")
///         .await?;
///
///     let entry = store.get("app.example.com").await;
///     assert_eq!(entry.map(|e| e.label), Some("app".to_string()));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    records: RwLock<HashMap<String, PersistedEntry>>,
}

#[derive(Debug, Serialize)]
struct StateFileRef<'a> {
    version: u32,
    updated_at: DateTime<Utc>,
    records: &'a HashMap<String, PersistedEntry>,
}

#[derive(Debug, Deserialize)]
struct StateFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    records: HashMap<String, PersistedEntry>,
}

impl FileStateStore {
    /// Open the store at `path`, reading any existing state
    ///
    /// Creates missing parent directories. Only a failure to create them is
    /// an error; unreadable state degrades to an empty store.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !fs::try_exists(parent).await.unwrap_or(false) {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let records = match Self::read_records(&path).await {
            Ok(records) => {
                tracing::info!(
                    "Loaded {} persisted records from {}",
                    records.len(),
                    path.display()
                );
                records
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable state file: {}. Starting empty.", e);
                HashMap::new()
            }
        };

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(path: &Path) -> Result<HashMap<String, PersistedEntry>, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("State file does not exist: {}", path.display());
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(Error::state_store(format!(
                    "Failed to read state file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let state_file: StateFile = serde_json::from_str(&content).map_err(|e| {
            Error::state_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            ))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Loading anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.records)
    }

    /// Write `records` atomically; caller holds the write lock
    async fn persist(&self, records: &HashMap<String, PersistedEntry>) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(&StateFileRef {
            version: STATE_FILE_VERSION,
            updated_at: Utc::now(),
            records,
        })?;

        let temp_path = self.temp_path();
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::state_store(format!(
                "Failed to write temp file {}: {}",
                temp_path.display(),
                e
            )));
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            )));
        }

        tracing::trace!("State written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn update(
        &self,
        hostname: &str,
        zone: &str,
        label: &str,
        target: IpAddr,
        record_type: &str,
    ) -> Result<(), Error> {
        let mut records = self.records.write().await;
        records.insert(
            hostname.to_string(),
            PersistedEntry::new(hostname, zone, label, target, record_type),
        );
        self.persist(&records).await
    }

    async fn remove(&self, hostname: &str) -> Result<(), Error> {
        let mut records = self.records.write().await;
        if records.remove(hostname).is_none() {
            return Ok(());
        }
        self.persist(&records).await
    }

    async fn get(&self, hostname: &str) -> Option<PersistedEntry> {
        self.records.read().await.get(hostname).cloned()
    }

    async fn get_all(&self) -> HashMap<String, PersistedEntry> {
        self.records.read().await.clone()
    }

    async fn has_any(&self) -> bool {
        !self.records.read().await.is_empty()
    }

    async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}
