//! Run-scoped working store for attachment bytes.
//!
//! Each run writes into its own namespace keyed by [`RunId`]. Nothing outside
//! the run reads or writes that namespace, and [`RunScope`] deletes it on
//! every exit path.
//!
//! Layout of [`FsStore`]:
//! ```text
//! <root>/
//!   run-<uuid>/
//!     cv.pdf
//!     cv_1.pdf
//!     letter.docx
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{HarvestError, Result};

const RUN_DIR_PREFIX: &str = "run-";

/// Identifier of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Key-value storage for a run's loose attachment files.
#[async_trait]
pub trait WorkingStore: Send + Sync {
    /// Stores `data` under `key` in the run's namespace, replacing any
    /// previous value.
    async fn put(&self, run: RunId, key: &str, data: &[u8]) -> Result<()>;

    /// Reads a stored value. Missing keys are `Ok(None)`.
    async fn get(&self, run: RunId, key: &str) -> Result<Option<Vec<u8>>>;

    /// Lists the run's keys in sorted order.
    async fn list(&self, run: RunId) -> Result<Vec<String>>;

    /// Deletes the run's namespace. Deleting a missing run succeeds.
    async fn delete_run(&self, run: RunId) -> Result<()>;
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
        return Err(HarvestError::Storage(format!("invalid storage key: {key:?}")));
    }
    Ok(())
}

/// Working store backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a store rooted at `root`. Directories are created on first
    /// write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding `run`'s files.
    #[must_use]
    pub fn run_dir(&self, run: RunId) -> PathBuf {
        self.root.join(format!("{RUN_DIR_PREFIX}{run}"))
    }

    /// Deletes run directories not modified for longer than `max_idle`.
    ///
    /// Returns how many were removed. Individual removal failures are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Storage` if the root cannot be listed.
    pub async fn sweep_expired(&self, max_idle: Duration) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(HarvestError::storage("listing working store", e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HarvestError::storage("listing working store", e))?
        {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(RUN_DIR_PREFIX) {
                continue;
            }

            let idle = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "cannot stat run directory");
                    continue;
                }
            };
            if idle <= max_idle {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    debug!(path = %entry.path().display(), ?idle, "removed expired run directory");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "failed to remove expired run directory");
                }
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl WorkingStore for FsStore {
    async fn put(&self, run: RunId, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key)?;
        let dir = self.run_dir(run);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| HarvestError::storage("creating run directory", e))?;
        tokio::fs::write(dir.join(key), data)
            .await
            .map_err(|e| HarvestError::storage(&format!("writing {key}"), e))
    }

    async fn get(&self, run: RunId, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match tokio::fs::read(self.run_dir(run).join(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(HarvestError::storage(&format!("reading {key}"), e)),
        }
    }

    async fn list(&self, run: RunId) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.run_dir(run)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HarvestError::storage("listing run directory", e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HarvestError::storage("listing run directory", e))?
        {
            keys.push(entry.file_name().to_string_lossy().into_owned());
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete_run(&self, run: RunId) -> Result<()> {
        match tokio::fs::remove_dir_all(self.run_dir(run)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(HarvestError::storage("deleting run directory", e)),
        }
    }
}

/// In-memory working store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: Mutex<HashMap<RunId, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs with stored data.
    pub async fn run_count(&self) -> usize {
        self.runs.lock().await.len()
    }
}

#[async_trait]
impl WorkingStore for MemoryStore {
    async fn put(&self, run: RunId, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.runs
            .lock()
            .await
            .entry(run)
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, run: RunId, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self
            .runs
            .lock()
            .await
            .get(&run)
            .and_then(|files| files.get(key))
            .cloned())
    }

    async fn list(&self, run: RunId) -> Result<Vec<String>> {
        Ok(self
            .runs
            .lock()
            .await
            .get(&run)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_run(&self, run: RunId) -> Result<()> {
        self.runs.lock().await.remove(&run);
        Ok(())
    }
}

/// Exclusive ownership of one run's namespace.
///
/// [`RunScope::release`] deletes the namespace. A scope dropped without
/// release schedules the deletion on the current runtime instead.
pub struct RunScope {
    store: Arc<dyn WorkingStore>,
    run: RunId,
    armed: bool,
}

impl fmt::Debug for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunScope")
            .field("run", &self.run)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl RunScope {
    /// Claims a fresh namespace in `store`.
    #[must_use]
    pub fn new(store: Arc<dyn WorkingStore>) -> Self {
        Self::with_id(store, RunId::new())
    }

    /// Claims the namespace of `run` in `store`.
    #[must_use]
    pub fn with_id(store: Arc<dyn WorkingStore>, run: RunId) -> Self {
        Self {
            store,
            run,
            armed: true,
        }
    }

    /// Returns the run id.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run
    }

    /// Stores an attachment for this run.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Storage` if the write fails.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.store.put(self.run, key, data).await
    }

    /// Reads an attachment stored for this run.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Storage` if the read fails.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(self.run, key).await
    }

    /// Lists this run's keys.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Storage` if the namespace cannot be listed.
    pub async fn list(&self) -> Result<Vec<String>> {
        self.store.list(self.run).await
    }

    /// Deletes the run's namespace. Failures are logged, never returned.
    pub async fn release(mut self) {
        self.armed = false;
        match self.store.delete_run(self.run).await {
            Ok(()) => debug!(run = %self.run, "working store released"),
            Err(e) => warn!(run = %self.run, error = %e, "failed to delete working store"),
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let store = Arc::clone(&self.store);
        let run = self.run;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = store.delete_run(run).await {
                    warn!(%run, error = %e, "failed to delete working store");
                }
            });
        } else {
            warn!(%run, "no runtime to delete working store; left for the expiry sweep");
        }
    }
}
