//! Pre-edit snapshots.
//!
//! A [`Snapshot`] holds the full original text of a file together with the
//! operation that was about to change it. Stores are keyed by a UUID and
//! restore by writing the original back atomically.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{SurgeonError, SurgeonResult};
use crate::util::atomic::atomic_write;
use crate::util::fs::read_text;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub path: PathBuf,
    pub operation: String,
    pub original: String,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(path: &Path, operation: &str, original: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.to_path_buf(),
            operation: operation.to_owned(),
            original: original.to_owned(),
            timestamp: Utc::now(),
        }
    }
}

pub trait BackupStore: Send + Sync {
    /// Persist `original` as the pre-edit content of `path`.
    fn snapshot(&self, path: &Path, operation: &str, original: &str) -> SurgeonResult<Uuid>;

    fn get(&self, id: Uuid) -> SurgeonResult<Option<Snapshot>>;

    /// Snapshots, newest first, optionally only those for `path`.
    fn list(&self, path: Option<&Path>) -> SurgeonResult<Vec<Snapshot>>;

    /// Drop a snapshot. Returns whether it existed.
    fn discard(&self, id: Uuid) -> SurgeonResult<bool>;

    /// Write the snapshot's content back over its file. `Ok(false)` for an unknown id.
    fn restore(&self, id: Uuid) -> SurgeonResult<bool> {
        let Some(snapshot) = self.get(id)? else {
            return Ok(false);
        };
        atomic_write(&snapshot.path, &snapshot.original)?;
        debug!(id = %id, path = %snapshot.path.display(), "snapshot restored");
        Ok(true)
    }
}

/// One JSON file per snapshot in a directory, pruned to the newest `max_snapshots`.
#[derive(Debug, Clone)]
pub struct FsBackupStore {
    dir: PathBuf,
    max_snapshots: usize,
}

impl FsBackupStore {
    pub fn new(dir: impl Into<PathBuf>, max_snapshots: usize) -> Self {
        Self {
            dir: dir.into(),
            max_snapshots: max_snapshots.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn load_all(&self) -> SurgeonResult<Vec<Snapshot>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|e| SurgeonError::fs(&self.dir, e))?;
        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_text(&path).and_then(|t| serde_json::from_str::<Snapshot>(&t).map_err(Into::into)) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable snapshot"),
            }
        }
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    fn prune(&self) -> SurgeonResult<()> {
        for old in self.load_all()?.into_iter().skip(self.max_snapshots) {
            debug!(id = %old.id, "pruning snapshot");
            let file = self.file_for(old.id);
            std::fs::remove_file(&file).map_err(|e| SurgeonError::fs(&file, e))?;
        }
        Ok(())
    }
}

impl BackupStore for FsBackupStore {
    fn snapshot(&self, path: &Path, operation: &str, original: &str) -> SurgeonResult<Uuid> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SurgeonError::fs(&self.dir, e))?;
        let snapshot = Snapshot::new(path, operation, original);
        let json = serde_json::to_string_pretty(&snapshot)?;
        atomic_write(&self.file_for(snapshot.id), &json)?;
        debug!(id = %snapshot.id, path = %path.display(), "snapshot written");
        if let Err(e) = self.prune() {
            warn!(error = %e, "snapshot pruning failed");
        }
        Ok(snapshot.id)
    }

    fn get(&self, id: Uuid) -> SurgeonResult<Option<Snapshot>> {
        let file = self.file_for(id);
        if !file.is_file() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&read_text(&file)?)?))
    }

    fn list(&self, path: Option<&Path>) -> SurgeonResult<Vec<Snapshot>> {
        let mut all = self.load_all()?;
        if let Some(p) = path {
            all.retain(|s| s.path == p);
        }
        Ok(all)
    }

    fn discard(&self, id: Uuid) -> SurgeonResult<bool> {
        let file = self.file_for(id);
        match std::fs::remove_file(&file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SurgeonError::fs(&file, e)),
        }
    }
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackupStore {
    snapshots: Mutex<Vec<Snapshot>>,
    max_snapshots: Option<usize>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_snapshots: usize) -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
            max_snapshots: Some(max_snapshots.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Snapshot>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BackupStore for MemoryBackupStore {
    fn snapshot(&self, path: &Path, operation: &str, original: &str) -> SurgeonResult<Uuid> {
        let snapshot = Snapshot::new(path, operation, original);
        let id = snapshot.id;
        let mut all = self.lock();
        // Newest first, same as the file store.
        all.insert(0, snapshot);
        if let Some(max) = self.max_snapshots {
            all.truncate(max);
        }
        Ok(id)
    }

    fn get(&self, id: Uuid) -> SurgeonResult<Option<Snapshot>> {
        Ok(self.lock().iter().find(|s| s.id == id).cloned())
    }

    fn list(&self, path: Option<&Path>) -> SurgeonResult<Vec<Snapshot>> {
        Ok(self
            .lock()
            .iter()
            .filter(|s| path.is_none_or(|p| s.path == p))
            .cloned()
            .collect())
    }

    fn discard(&self, id: Uuid) -> SurgeonResult<bool> {
        let mut all = self.lock();
        let before = all.len();
        all.retain(|s| s.id != id);
        Ok(all.len() != before)
    }
}
