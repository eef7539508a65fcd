//! Durable storage for committed registry versions.
//!
//! The registry is persisted as one named entry ([`LICENSES_ENTRY`]) inside
//! the larger cluster configuration document. The entry is absent when no
//! license is installed; all other entries are left untouched.

use crate::error::{RegistryError, RegistryResult};
use crate::state::{CommittedState, LicensesMetadata, RegistryState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Name of the licensing entry inside the cluster configuration document.
pub const LICENSES_ENTRY: &str = "licenses";

/// Persistence for committed registry versions.
///
/// Implementations are blocking; the coordinator calls them from
/// `spawn_blocking`.
pub trait RegistryStore: Send + Sync + 'static {
    /// Loads the last committed version, or `None` if nothing was ever persisted.
    fn load(&self) -> RegistryResult<Option<CommittedState>>;

    /// Durably records a committed version.
    fn persist(&self, committed: &CommittedState) -> RegistryResult<()>;
}

/// In-memory store (for tests and single-process clusters).
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Mutex<Option<CommittedState>>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `persist` fail until reset. Used to exercise
    /// the coordinator's mid-commit failure path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the last persisted version, if any.
    pub fn last_persisted(&self) -> Option<CommittedState> {
        self.committed.lock().ok().and_then(|c| c.clone())
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> RegistryResult<Option<CommittedState>> {
        let committed = self
            .committed
            .lock()
            .map_err(|_| RegistryError::Persistence("store lock poisoned".to_string()))?;
        Ok(committed.clone())
    }

    fn persist(&self, committed: &CommittedState) -> RegistryResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistryError::Persistence(format!(
                "injected failure persisting version {}",
                committed.version
            )));
        }
        let mut slot = self
            .committed
            .lock()
            .map_err(|_| RegistryError::Persistence("store lock poisoned".to_string()))?;
        *slot = Some(committed.clone());
        Ok(())
    }
}

/// On-disk shape of the cluster configuration document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ClusterConfigDocument {
    /// Version of the last committed registry update.
    #[serde(default)]
    version: u64,
    /// Named custom entries. Only [`LICENSES_ENTRY`] is owned by the registry.
    #[serde(default)]
    custom: BTreeMap<String, serde_json::Value>,
}

/// File-backed store: a JSON cluster configuration document.
///
/// Writes go to a sibling temp file which is then renamed over the
/// document, so a crash mid-write leaves the previous version intact.
#[derive(Debug)]
pub struct ClusterConfigFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ClusterConfigFile {
    /// Opens (without creating) the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> RegistryResult<ClusterConfigDocument> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                RegistryError::Persistence(format!(
                    "corrupt cluster config {}: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(ClusterConfigDocument::default())
            }
            Err(e) => Err(RegistryError::Persistence(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write_document(&self, document: &ClusterConfigDocument) -> RegistryResult<()> {
        let json = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| {
            RegistryError::Persistence(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            RegistryError::Persistence(format!(
                "failed to replace {}: {e}",
                self.path.display()
            ))
        })
    }
}

impl RegistryStore for ClusterConfigFile {
    fn load(&self) -> RegistryResult<Option<CommittedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let document = self.read_document()?;
        let metadata = match document.custom.get(LICENSES_ENTRY) {
            Some(entry) => Some(serde_json::from_value::<LicensesMetadata>(entry.clone()).map_err(
                |e| RegistryError::Persistence(format!("corrupt '{LICENSES_ENTRY}' entry: {e}")),
            )?),
            None => None,
        };
        Ok(Some(CommittedState::new(
            document.version,
            RegistryState::from_metadata(metadata),
        )))
    }

    fn persist(&self, committed: &CommittedState) -> RegistryResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| RegistryError::Persistence("store lock poisoned".to_string()))?;

        let mut document = self.read_document()?;
        document.version = committed.version;
        match committed.state.clone().into_metadata() {
            Some(metadata) => {
                document
                    .custom
                    .insert(LICENSES_ENTRY.to_string(), serde_json::to_value(metadata)?);
            }
            None => {
                document.custom.remove(LICENSES_ENTRY);
            }
        }
        self.write_document(&document)?;
        debug!(
            "Persisted registry version {} to {}",
            committed.version,
            self.path.display()
        );
        Ok(())
    }
}
