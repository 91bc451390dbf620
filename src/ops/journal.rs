//! Rollback records for files edited but not yet committed.
//!
//! One record per path. A second edit to the same path before commit keeps
//! the first record, so rollback always returns to the content the file had
//! before it was first touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackRecord {
    pub path: PathBuf,
    #[serde(skip)]
    pub original: String,
    pub snapshot_id: Option<Uuid>,
    pub operation: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RollbackJournal {
    records: Mutex<HashMap<PathBuf, RollbackRecord>>,
}

impl RollbackJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember how to undo an edit. Returns `false` if the path already had a record.
    pub fn record(&self, record: RollbackRecord) -> bool {
        let mut records = self.lock();
        if records.contains_key(&record.path) {
            return false;
        }
        records.insert(record.path.clone(), record);
        true
    }

    /// Remove and return the record for `path`.
    pub fn take(&self, path: &Path) -> Option<RollbackRecord> {
        self.lock().remove(path)
    }

    /// Put a record back after a failed restore.
    pub fn reinstate(&self, record: RollbackRecord) {
        self.lock().entry(record.path.clone()).or_insert(record);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    /// Records awaiting commit or rollback, sorted by path.
    pub fn pending(&self) -> Vec<RollbackRecord> {
        let mut all: Vec<RollbackRecord> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, RollbackRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, original: &str) -> RollbackRecord {
        RollbackRecord {
            path: PathBuf::from(path),
            original: original.to_owned(),
            snapshot_id: None,
            operation: "replace".to_owned(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_record_wins() {
        let j = RollbackJournal::new();
        assert!(j.record(record("a.py", "v1")));
        assert!(!j.record(record("a.py", "v2")));
        assert_eq!(j.take(Path::new("a.py")).map(|r| r.original), Some("v1".to_owned()));
        assert!(j.take(Path::new("a.py")).is_none());
    }

    #[test]
    fn test_pending_and_reinstate() {
        let j = RollbackJournal::new();
        j.record(record("b.py", "b"));
        j.record(record("a.py", "a"));
        let pending = j.pending();
        assert_eq!(pending[0].path, PathBuf::from("a.py"));
        let r = j.take(Path::new("b.py")).expect("present");
        j.reinstate(r);
        assert!(j.contains(Path::new("b.py")));
    }
}
