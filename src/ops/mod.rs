//! Mutation operations: locate, snapshot, edit, validate, and undo.
//!
//! [`Surgeon`] is the entry point. Every call follows the same path:
//!
//! ```text
//! read file → select engine → locate → (not found: Failure)
//!           → preview? return → snapshot → write → re-validate → result
//! ```
//!
//! Only programmer errors (empty path, missing insert text) come back as
//! `Err`. Everything that can go wrong with the file or the pattern is
//! reported inside [`OperationResult`].

pub mod backup;
pub mod delete;
pub mod insert;
pub mod journal;
pub mod replace;

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{Capability, CapabilitySet, OperationKind};
use crate::config::{BackupPolicy, SurgeonConfig};
use crate::engine::{EditOutcome, Engine, EngineOptions, InstrumentedEngine, Placement, Registry};
use crate::error::{SurgeonError, SurgeonResult};
use crate::language;
use crate::matcher::{Match, MatchOptions};
use crate::selector::{EngineSelector, Selection, SelectionRequest};
use crate::structure;
use crate::util::atomic::atomic_write;
use crate::util::diff::{diff_stats, unified_diff};
use crate::util::fs::read_text;

pub use backup::{BackupStore, FsBackupStore, MemoryBackupStore, Snapshot};
pub use journal::{RollbackJournal, RollbackRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Search,
    Replace,
    InsertBefore,
    InsertAfter,
    Delete,
    Append,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Replace => "replace",
            Self::InsertBefore => "insert_before",
            Self::InsertAfter => "insert_after",
            Self::Delete => "delete",
            Self::Append => "append",
        }
    }

    /// The engine primitive this operation drives.
    pub const fn kind(self) -> OperationKind {
        match self {
            Self::Search => OperationKind::Search,
            Self::Replace => OperationKind::Replace,
            Self::InsertBefore => OperationKind::InsertBefore,
            Self::InsertAfter | Self::Append => OperationKind::InsertAfter,
            Self::Delete => OperationKind::Delete,
        }
    }

    /// Operations that take replacement or insertion text.
    pub const fn needs_content(self) -> bool {
        matches!(
            self,
            Self::Replace | Self::InsertBefore | Self::InsertAfter | Self::Append
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "search" | "find" => Ok(Self::Search),
            "replace" => Ok(Self::Replace),
            "insert_before" => Ok(Self::InsertBefore),
            "insert_after" => Ok(Self::InsertAfter),
            "delete" | "remove" => Ok(Self::Delete),
            "append" => Ok(Self::Append),
            _ => Err(format!("unknown operation: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    /// Treat the pattern as a regex; `^` and `$` then match at line boundaries.
    pub regex_mode: bool,
    /// Upper bound on edit sites. Zero or negative means unlimited.
    pub max_replacements: i64,
    /// Compute the edit and return it without touching the file.
    pub preview_only: bool,
    /// Capability names the engine must have, on top of the search kind.
    pub required_capabilities: Vec<String>,
    /// Overrides detection from the file name.
    pub language: Option<String>,
    /// Skip selection and use this registered engine.
    pub engine: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            whole_word: false,
            regex_mode: false,
            max_replacements: -1,
            preview_only: false,
            required_capabilities: Vec::new(),
            language: None,
            engine: None,
        }
    }
}

impl ExecuteOptions {
    pub fn limit(&self) -> Option<usize> {
        usize::try_from(self.max_replacements).ok().filter(|n| *n > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    /// The edit was written but the file failed its structural re-check.
    PartialSuccess,
    Failure,
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub message: String,
    pub matches: Vec<Match>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub operation_count: usize,
    pub metadata: Map<String, Value>,
}

impl OperationResult {
    pub fn new(status: OperationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            matches: Vec::new(),
            modified_content: None,
            error: None,
            operation_count: 0,
            metadata: Map::new(),
        }
    }

    /// A failed result carrying the error's message and kind tag.
    pub fn failure(err: &SurgeonError) -> Self {
        let status = match err {
            SurgeonError::UnsupportedOperation { .. } => OperationStatus::NotSupported,
            _ => OperationStatus::Failure,
        };
        let mut result = Self::new(status, err.to_string());
        result.error = Some(err.to_string());
        result
            .metadata
            .insert("error_kind".to_owned(), json!(err.kind_tag()));
        result
    }

    pub fn success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        for (k, v) in metadata {
            self.metadata.entry(k).or_insert(v);
        }
        self
    }

    #[must_use]
    fn with_edit(mut self, edit: EditOutcome) -> Self {
        self.operation_count = edit.count;
        self.matches = edit.matches;
        self.modified_content = Some(edit.content);
        self
    }

    /// JSON form, with the derived `success` flag included.
    pub fn to_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Value::Object(map) = &mut value {
            map.insert("success".to_owned(), json!(self.success()));
        }
        value
    }
}

/// Engine picked for one call, and how.
struct Chosen {
    engine: Arc<InstrumentedEngine>,
    selection: Option<Selection>,
}

pub struct Surgeon {
    workspace: PathBuf,
    config: SurgeonConfig,
    selector: EngineSelector,
    backups: Box<dyn BackupStore>,
    journal: RollbackJournal,
}

impl Surgeon {
    /// Load `<workspace>/.surgeon/config.toml` (or defaults) and build everything from it.
    pub fn open(workspace: &Path) -> SurgeonResult<Self> {
        let config = SurgeonConfig::load(workspace)?;
        Ok(Self::with_config(workspace, config))
    }

    pub fn with_config(workspace: impl Into<PathBuf>, config: SurgeonConfig) -> Self {
        let workspace = workspace.into();
        let registry = Arc::new(Registry::from_config(&config));
        let backups: Box<dyn BackupStore> = if config.backup.in_memory {
            Box::new(MemoryBackupStore::with_limit(config.backup.max_snapshots))
        } else {
            Box::new(FsBackupStore::new(
                config.backup_dir(&workspace),
                config.backup.max_snapshots,
            ))
        };
        Self::with_parts(workspace, config, registry, backups)
    }

    pub fn with_parts(
        workspace: impl Into<PathBuf>,
        config: SurgeonConfig,
        registry: Arc<Registry>,
        backups: Box<dyn BackupStore>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            selector: EngineSelector::with_policy(registry, config.selector.clone()),
            config,
            backups,
            journal: RollbackJournal::new(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub const fn config(&self) -> &SurgeonConfig {
        &self.config
    }

    pub const fn selector(&self) -> &EngineSelector {
        &self.selector
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.selector.registry()
    }

    pub fn backups(&self) -> &dyn BackupStore {
        self.backups.as_ref()
    }

    /// Edits awaiting commit or rollback.
    pub fn pending(&self) -> Vec<RollbackRecord> {
        self.journal.pending()
    }

    /// Relative paths resolve against the workspace.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Resolve `target` and make sure it stays inside the workspace.
    ///
    /// `.` and `..` are folded before the disk is consulted, then the deepest
    /// existing ancestor is canonicalized so a symlink cannot lead out. The
    /// target itself need not exist yet.
    pub fn confine(&self, target: &Path) -> SurgeonResult<PathBuf> {
        if target.as_os_str().as_encoded_bytes().contains(&0) {
            return Err(SurgeonError::InvalidRequest("path contains a null byte".to_owned()));
        }
        let outside = || SurgeonError::OutsideWorkspace {
            path: target.to_path_buf(),
        };
        let root = self
            .workspace
            .canonicalize()
            .map_err(|e| SurgeonError::fs(&self.workspace, e))?;
        let absolute = std::path::absolute(self.resolve(target)).map_err(|e| SurgeonError::fs(target, e))?;
        let lexical = fold_dots(&absolute);

        let mut existing = lexical.as_path();
        let mut tail = Vec::new();
        while !existing.exists() {
            let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                return Err(outside());
            };
            tail.push(name);
            existing = parent;
        }
        let mut resolved = existing
            .canonicalize()
            .map_err(|e| SurgeonError::fs(existing, e))?;
        resolved.extend(tail.iter().rev());

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            debug!(path = %target.display(), resolved = %resolved.display(), "path outside workspace");
            Err(outside())
        }
    }

    /// Run the engine selector the way `execute` would for this request.
    pub fn explain(
        &self,
        operation: Operation,
        pattern: &str,
        content: Option<&str>,
        options: &ExecuteOptions,
    ) -> Selection {
        let mut required = CapabilitySet::from_names(&options.required_capabilities);
        let primary = if required.contains(Capability::StructuralSearch)
            || required.contains(Capability::TreeAware)
        {
            Capability::StructuralSearch
        } else if options.regex_mode {
            Capability::RegexSearch
        } else {
            Capability::LiteralSearch
        };
        // Extra capabilities narrow the choice; they never replace the search kind.
        required.insert(primary);
        debug!(op = %operation, primary = %primary, required = %required, "selecting engine");
        self.selector.select(&SelectionRequest {
            operation: Some(primary),
            capabilities: required,
            language: options.language.as_deref(),
            pattern: (!pattern.is_empty()).then_some(pattern),
            content,
            complexity: None,
        })
    }

    pub fn execute(
        &self,
        operation: Operation,
        target: &Path,
        pattern: &str,
        content: Option<&str>,
        options: &ExecuteOptions,
    ) -> SurgeonResult<OperationResult> {
        if target.as_os_str().is_empty() {
            return Err(SurgeonError::InvalidRequest("target path is empty".to_owned()));
        }
        if pattern.is_empty() && operation != Operation::Append {
            return Err(SurgeonError::InvalidRequest(format!(
                "{operation} needs a non-empty pattern"
            )));
        }
        let text = match content {
            Some(text) => text,
            None if operation.needs_content() => {
                return Err(SurgeonError::InvalidRequest(format!("{operation} needs content")));
            }
            None => "",
        };

        let started = Instant::now();
        let path = self.resolve(target);
        let mut result = self.run(operation, &path, pattern, text, options);
        result.metadata.insert(
            "execution_time_ms".to_owned(),
            json!(started.elapsed().as_secs_f64() * 1000.0),
        );
        info!(
            op = %operation,
            path = %path.display(),
            status = ?result.status,
            count = result.operation_count,
            "operation finished"
        );
        Ok(result)
    }

    fn run(
        &self,
        operation: Operation,
        path: &Path,
        pattern: &str,
        text: &str,
        options: &ExecuteOptions,
    ) -> OperationResult {
        let original = match read_text(path) {
            Ok(original) => original,
            Err(e) => return OperationResult::failure(&e),
        };

        let language = options
            .language
            .clone()
            .or_else(|| language::detect(path).map(str::to_owned));
        let options = ExecuteOptions {
            language: language.clone(),
            ..options.clone()
        };

        let mut metadata = Map::new();
        metadata.insert("operation".to_owned(), json!(operation));
        metadata.insert("language".to_owned(), json!(language));

        let chosen = match self.choose(operation, pattern, &original, &options) {
            Ok(chosen) => chosen,
            Err(e) => return OperationResult::failure(&e).with_metadata(metadata),
        };
        let engine = chosen.engine.as_ref();
        metadata.insert("engine_used".to_owned(), json!(engine.name()));
        if let Some(selection) = &chosen.selection {
            metadata.insert(
                "selection".to_owned(),
                serde_json::to_value(selection).unwrap_or_default(),
            );
        }

        if !engine.supports_operation(operation.kind()) {
            let err = SurgeonError::UnsupportedOperation {
                engine: engine.name().to_owned(),
                operation: operation.to_string(),
            };
            return OperationResult::failure(&err).with_metadata(metadata);
        }

        let engine_opts = EngineOptions {
            regex: options.regex_mode,
            matching: MatchOptions {
                case_sensitive: options.case_sensitive,
                whole_word: options.whole_word,
                multi_line: options.regex_mode,
                auto_escape: self.config.matching.auto_escape && !options.regex_mode,
                limit: options.limit(),
                ..MatchOptions::default()
            },
            language: language.clone(),
        };

        let edit = match operation {
            Operation::Search => {
                return match engine.search(&original, pattern, &engine_opts) {
                    Ok(found) if found.is_empty() => {
                        OperationResult::failure(&not_found(path, pattern)).with_metadata(metadata)
                    }
                    Ok(found) => {
                        let mut result = OperationResult::new(
                            OperationStatus::Success,
                            format!("found {} match(es)", found.len()),
                        );
                        result.operation_count = found.len();
                        result.matches = found;
                        result.with_metadata(metadata)
                    }
                    Err(e) => OperationResult::failure(&e).with_metadata(metadata),
                };
            }
            Operation::Replace => replace::replace(engine, &original, pattern, text, &engine_opts).inspect(|o| {
                metadata.insert("touched_lines".to_owned(), json!(replace::touched_lines(&o.matches)));
                if !options.regex_mode && replace::reintroduces_pattern(pattern, text, options.case_sensitive) {
                    metadata.insert("reapplies".to_owned(), json!(true));
                }
            }),
            Operation::InsertBefore => {
                insert::insert(engine, &original, pattern, text, Placement::Before, &engine_opts)
            }
            Operation::InsertAfter => {
                insert::insert(engine, &original, pattern, text, Placement::After, &engine_opts)
            }
            Operation::Append => insert::append(engine, &original, pattern, text, &engine_opts),
            Operation::Delete => engine.delete(&original, pattern, &engine_opts).map(|edit| {
                let plan = delete::plan(&original, &edit.matches);
                if !plan.dependencies.is_empty() {
                    info!(
                        path = %path.display(),
                        orphaned = ?plan.dependencies.orphaned_calls,
                        dangling = ?plan.dependencies.dangling_references,
                        "deleted code is still referenced"
                    );
                }
                metadata.insert("deletions".to_owned(), json!(plan.previews));
                metadata.insert("dependencies".to_owned(), json!(plan.dependencies));
                edit
            }),
        };

        let edit = match edit {
            Ok(edit) => edit,
            Err(e) => return OperationResult::failure(&e).with_metadata(metadata),
        };
        if edit.count == 0 {
            return OperationResult::failure(&not_found(path, pattern)).with_metadata(metadata);
        }

        let file_name = path.file_name().map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        metadata.insert("diff".to_owned(), json!(unified_diff(&file_name, &original, &edit.content)));
        metadata.insert("diff_stats".to_owned(), json!(diff_stats(&original, &edit.content)));

        if options.preview_only {
            metadata.insert("preview_only".to_owned(), json!(true));
            return OperationResult::new(
                OperationStatus::Success,
                format!("preview: {} edit(s), file not written", edit.count),
            )
            .with_edit(edit)
            .with_metadata(metadata);
        }

        if edit.content == original {
            return OperationResult::new(OperationStatus::Success, "content already as requested")
                .with_edit(edit)
                .with_metadata(metadata);
        }

        self.write(operation, path, &original, edit, language.as_deref(), metadata)
    }

    fn choose(
        &self,
        operation: Operation,
        pattern: &str,
        original: &str,
        options: &ExecuteOptions,
    ) -> SurgeonResult<Chosen> {
        if let Some(name) = &options.engine {
            let engine = self
                .registry()
                .get(name)
                .ok_or_else(|| SurgeonError::EngineUnavailable(format!("no engine named {name}")))?;
            if !engine.is_available() {
                return Err(SurgeonError::EngineUnavailable(name.clone()));
            }
            return Ok(Chosen {
                engine,
                selection: None,
            });
        }

        let selection = self.explain(operation, pattern, Some(original), options);
        let engine = if selection.engine.is_available() {
            Arc::clone(&selection.engine)
        } else {
            warn!(engine = %selection.engine_name, "selected engine is unavailable, using literal fallback");
            self.registry().fallback()
        };
        Ok(Chosen {
            engine,
            selection: Some(selection),
        })
    }

    /// Snapshot, write, record for rollback, re-validate.
    fn write(
        &self,
        operation: Operation,
        path: &Path,
        original: &str,
        edit: EditOutcome,
        language: Option<&str>,
        mut metadata: Map<String, Value>,
    ) -> OperationResult {
        let snapshot_id = match self.backups.snapshot(path, operation.as_str(), original) {
            Ok(id) => {
                metadata.insert("snapshot_id".to_owned(), json!(id));
                Some(id)
            }
            Err(e) => {
                let err = SurgeonError::Backup {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                };
                match self.config.backup.policy {
                    BackupPolicy::FailOpen => {
                        warn!(path = %path.display(), error = %e, "snapshot failed, editing without backup");
                        metadata.insert("backup_error".to_owned(), json!(err.to_string()));
                        None
                    }
                    BackupPolicy::FailClosed => {
                        warn!(path = %path.display(), error = %e, "snapshot failed, edit refused");
                        return OperationResult::failure(&err).with_metadata(metadata);
                    }
                }
            }
        };

        let fresh = self.journal.record(RollbackRecord {
            path: path.to_path_buf(),
            original: original.to_owned(),
            snapshot_id,
            operation: operation.as_str().to_owned(),
            recorded_at: Utc::now(),
        });
        if let Err(e) = atomic_write(path, &edit.content) {
            if fresh {
                self.journal.take(path);
            }
            return OperationResult::failure(&e).with_metadata(metadata);
        }

        let issues = if self.config.validation.enabled {
            structure::introduced_issues(original, &edit.content, language)
        } else {
            Vec::new()
        };
        let count = edit.count;
        if issues.is_empty() {
            return OperationResult::new(
                OperationStatus::Success,
                format!("{operation}: {count} edit(s) applied to {}", path.display()),
            )
            .with_edit(edit)
            .with_metadata(metadata);
        }

        metadata.insert("validation_issues".to_owned(), json!(issues));
        let err = SurgeonError::PostMutationValidation {
            path: path.to_path_buf(),
            issues,
        };
        warn!(path = %path.display(), error = %err, "edit written but validation failed");
        let mut result = OperationResult::new(
            OperationStatus::PartialSuccess,
            format!("{operation}: {count} edit(s) applied, validation failed; rollback is available"),
        )
        .with_edit(edit)
        .with_metadata(metadata);
        result.error = Some(err.to_string());
        result
    }

    /// Put the file back the way it was before its first uncommitted edit.
    ///
    /// Returns `Ok(false)` when there is nothing to roll back, so a second
    /// call is a no-op.
    pub fn rollback(&self, target: &Path) -> SurgeonResult<bool> {
        let path = self.resolve(target);
        let Some(record) = self.journal.take(&path) else {
            debug!(path = %path.display(), "nothing to roll back");
            return Ok(false);
        };
        match atomic_write(&path, &record.original) {
            Ok(()) => {
                info!(path = %path.display(), op = %record.operation, "rolled back");
                Ok(true)
            }
            Err(write_err) => {
                warn!(path = %path.display(), error = %write_err, "direct restore failed, trying backup store");
                if let Some(id) = record.snapshot_id {
                    match self.backups.restore(id) {
                        Ok(true) => return Ok(true),
                        Ok(false) => warn!(id = %id, "snapshot missing from backup store"),
                        Err(e) => warn!(id = %id, error = %e, "backup store restore failed"),
                    }
                }
                self.journal.reinstate(record);
                Err(write_err)
            }
        }
    }

    /// Roll back every pending edit. Returns how many files were restored.
    pub fn rollback_all(&self) -> SurgeonResult<usize> {
        let mut restored = 0;
        for record in self.journal.pending() {
            if self.rollback(&record.path)? {
                restored += 1;
            }
        }
        Ok(restored)
    }

    /// Accept the edits to `target`. Returns `false` when nothing was pending.
    pub fn commit(&self, target: &Path) -> bool {
        let path = self.resolve(target);
        let committed = self.journal.take(&path).is_some();
        if committed {
            info!(path = %path.display(), "committed");
        }
        committed
    }

    /// Restore a snapshot straight from the backup store.
    pub fn restore_snapshot(&self, id: Uuid) -> SurgeonResult<bool> {
        let restored = self.backups.restore(id)?;
        if restored {
            if let Some(snapshot) = self.backups.get(id)? {
                self.journal.take(&snapshot.path);
            }
        }
        Ok(restored)
    }
}

impl fmt::Debug for Surgeon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surgeon")
            .field("workspace", &self.workspace)
            .field("selector", &self.selector)
            .field("pending", &self.journal.pending().len())
            .finish_non_exhaustive()
    }
}

/// Fold `.` and `..` components without touching the disk.
fn fold_dots(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

fn not_found(path: &Path, pattern: &str) -> SurgeonError {
    SurgeonError::PatternNotFound {
        path: path.to_path_buf(),
        pattern: pattern.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl BackupStore for BrokenStore {
        fn snapshot(&self, path: &Path, _: &str, _: &str) -> SurgeonResult<Uuid> {
            Err(SurgeonError::Backup {
                path: path.to_path_buf(),
                reason: "disk full".to_owned(),
            })
        }

        fn get(&self, _: Uuid) -> SurgeonResult<Option<Snapshot>> {
            Ok(None)
        }

        fn list(&self, _: Option<&Path>) -> SurgeonResult<Vec<Snapshot>> {
            Ok(Vec::new())
        }

        fn discard(&self, _: Uuid) -> SurgeonResult<bool> {
            Ok(false)
        }
    }

    fn memory_config() -> SurgeonConfig {
        let mut config = SurgeonConfig::default();
        config.backup.in_memory = true;
        config.engines.disabled = vec!["ast-grep".to_owned()];
        config
    }

    fn setup(name: &str, content: &str) -> (tempfile::TempDir, Surgeon, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(name);
        std::fs::write(&path, content).expect("seed");
        let surgeon = Surgeon::with_config(dir.path(), memory_config());
        (dir, surgeon, path)
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).expect("read")
    }

    #[test]
    fn test_delete_function_block() {
        let (_dir, s, path) = setup("m.py", "def foo():\n    return 1\n\ndef bar():\n    return 2");
        let r = s
            .execute(Operation::Delete, &path, "def foo():", None, &ExecuteOptions::default())
            .expect("valid request");
        assert!(r.success(), "{r:?}");
        assert_eq!(read(&path), "\ndef bar():\n    return 2");
        assert_eq!(r.operation_count, 1);
        assert!(r.metadata.contains_key("deletions"));
        assert!(r.metadata.contains_key("execution_time_ms"));
        assert_eq!(r.metadata["engine_used"], json!("literal"));
    }

    #[test]
    fn test_insert_after_first_import_only() {
        let (_dir, s, path) = setup("imports.py", "import os\nimport sys");
        let opts = ExecuteOptions {
            regex_mode: true,
            max_replacements: 1,
            ..ExecuteOptions::default()
        };
        let r = s
            .execute(Operation::InsertAfter, &path, r"^import\s+\w+", Some("import json"), &opts)
            .expect("valid request");
        assert!(r.success(), "{r:?}");
        assert_eq!(read(&path), "import os\nimport json\nimport sys");
        assert_eq!(r.metadata["engine_used"], json!("regex"));
    }

    #[test]
    fn test_rollback_restores_bytes_and_is_idempotent() {
        let original = "x = 1\r\ny = 2\r\n";
        let (_dir, s, path) = setup("v.py", original);
        let opts = ExecuteOptions::default();
        s.execute(Operation::Replace, &path, "1", Some("10"), &opts).expect("ok");
        s.execute(Operation::InsertBefore, &path, "y = 2", Some("z = 3"), &opts).expect("ok");
        assert_ne!(read(&path), original);
        assert_eq!(s.pending().len(), 1);

        assert!(s.rollback(&path).expect("rollback"));
        assert_eq!(read(&path), original);
        assert!(!s.rollback(&path).expect("second rollback"));
        assert_eq!(read(&path), original);
    }

    #[test]
    fn test_replace_twice_changes_nothing_more() {
        let (_dir, s, path) = setup("r.py", "old_name()\nold_name()\n");
        let opts = ExecuteOptions::default();
        let first = s
            .execute(Operation::Replace, &path, "old_name", Some("new_name"), &opts)
            .expect("ok");
        assert_eq!(first.operation_count, 2);
        let after_first = read(&path);

        let second = s
            .execute(Operation::Replace, &path, "old_name", Some("new_name"), &opts)
            .expect("ok");
        assert_eq!(second.operation_count, 0);
        assert_eq!(second.status, OperationStatus::Failure);
        assert_eq!(second.metadata["error_kind"], json!("pattern_not_found"));
        assert_eq!(read(&path), after_first);
    }

    #[test]
    fn test_preview_only_leaves_file_and_journal_alone() {
        let (_dir, s, path) = setup("p.py", "a = 1\n");
        let opts = ExecuteOptions {
            preview_only: true,
            ..ExecuteOptions::default()
        };
        let r = s
            .execute(Operation::Replace, &path, "1", Some("2"), &opts)
            .expect("ok");
        assert!(r.success());
        assert_eq!(r.modified_content.as_deref(), Some("a = 2\n"));
        assert!(r.metadata["diff"].as_str().expect("diff").contains("+a = 2"));
        assert_eq!(read(&path), "a = 1\n");
        assert!(s.pending().is_empty());
        assert!(s.backups().list(None).expect("list").is_empty());
    }

    #[test]
    fn test_missing_file_is_classified() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = Surgeon::with_config(dir.path(), memory_config());
        let r = s
            .execute(Operation::Search, Path::new("nope.py"), "x", None, &ExecuteOptions::default())
            .expect("valid request");
        assert_eq!(r.status, OperationStatus::Failure);
        assert_eq!(r.metadata["error_kind"], json!("file_not_found"));
    }

    #[test]
    fn test_programmer_errors() {
        let (_dir, s, path) = setup("e.py", "x\n");
        let opts = ExecuteOptions::default();
        assert!(matches!(
            s.execute(Operation::Replace, &path, "x", None, &opts),
            Err(SurgeonError::InvalidRequest(_))
        ));
        assert!(matches!(
            s.execute(Operation::Search, Path::new(""), "x", None, &opts),
            Err(SurgeonError::InvalidRequest(_))
        ));
        assert!(matches!(
            s.execute(Operation::Delete, &path, "", None, &opts),
            Err(SurgeonError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_invalid_regex_reported_in_result() {
        let (_dir, s, path) = setup("i.py", "value(1)\n");
        let opts = ExecuteOptions {
            regex_mode: true,
            ..ExecuteOptions::default()
        };
        let r = s
            .execute(Operation::Replace, &path, r"value(\d+[", Some("v"), &opts)
            .expect("valid request");
        assert_eq!(r.status, OperationStatus::Failure);
        assert_eq!(r.metadata["error_kind"], json!("invalid_pattern"));
        assert_eq!(read(&path), "value(1)\n");
    }

    #[test]
    fn test_validation_failure_is_partial_success() {
        let (_dir, s, path) = setup("b.py", "def f():\n    return (1)\n");
        let r = s
            .execute(Operation::Replace, &path, "(1)", Some("(1"), &ExecuteOptions::default())
            .expect("ok");
        assert_eq!(r.status, OperationStatus::PartialSuccess);
        assert!(!r.success());
        assert!(r.metadata.contains_key("validation_issues"));
        assert_eq!(read(&path), "def f():\n    return (1\n");
        assert!(s.rollback(&path).expect("rollback"));
        assert_eq!(read(&path), "def f():\n    return (1)\n");
    }

    #[test]
    fn test_backup_policy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("f.py");
        std::fs::write(&path, "a\n").expect("seed");
        let registry = Arc::new(Registry::from_config(&memory_config()));

        let open = Surgeon::with_parts(dir.path(), memory_config(), Arc::clone(&registry), Box::new(BrokenStore));
        let r = open
            .execute(Operation::Replace, &path, "a", Some("b"), &ExecuteOptions::default())
            .expect("ok");
        assert!(r.success());
        assert!(r.metadata.contains_key("backup_error"));
        assert_eq!(read(&path), "b\n");
        assert!(open.rollback(&path).expect("journal still has the original"));

        let mut config = memory_config();
        config.backup.policy = BackupPolicy::FailClosed;
        let closed = Surgeon::with_parts(dir.path(), config, registry, Box::new(BrokenStore));
        let r = closed
            .execute(Operation::Replace, &path, "a", Some("b"), &ExecuteOptions::default())
            .expect("ok");
        assert_eq!(r.status, OperationStatus::Failure);
        assert_eq!(r.metadata["error_kind"], json!("backup_failed"));
        assert_eq!(read(&path), "a\n");
    }

    #[test]
    fn test_commit_releases_record() {
        let (_dir, s, path) = setup("c.py", "a\n");
        s.execute(Operation::Append, &path, "", Some("b"), &ExecuteOptions::default())
            .expect("ok");
        assert_eq!(read(&path), "a\nb\n");
        assert!(s.commit(&path));
        assert!(!s.commit(&path));
        assert!(!s.rollback(&path).expect("nothing pending"));
        assert_eq!(read(&path), "a\nb\n");
    }

    #[test]
    fn test_snapshot_restore_from_store() {
        let (_dir, s, path) = setup("s.py", "one\n");
        let r = s
            .execute(Operation::Replace, &path, "one", Some("two"), &ExecuteOptions::default())
            .expect("ok");
        let id: Uuid = serde_json::from_value(r.metadata["snapshot_id"].clone()).expect("uuid");
        assert!(s.restore_snapshot(id).expect("restore"));
        assert_eq!(read(&path), "one\n");
        assert!(s.pending().is_empty());
    }

    #[test]
    fn test_unknown_engine_override() {
        let (_dir, s, path) = setup("o.py", "a\n");
        let opts = ExecuteOptions {
            engine: Some("nonexistent".to_owned()),
            ..ExecuteOptions::default()
        };
        let r = s.execute(Operation::Search, &path, "a", None, &opts).expect("ok");
        assert_eq!(r.metadata["error_kind"], json!("engine_unavailable"));
    }

    #[test]
    fn test_extra_capabilities_keep_the_search_kind() {
        let content = "class Outer:\n    class Inner:\n        def one(self):\n            return 1\n\n    def two(self):\n        return 2\n";
        let (_dir, s, path) = setup("nested.py", content);
        let opts = ExecuteOptions {
            regex_mode: true,
            required_capabilities: vec!["multiline".to_owned()],
            ..ExecuteOptions::default()
        };
        let selection = s.explain(Operation::Replace, r"return (\d+)", Some(content), &opts);
        assert_eq!(selection.primary, Capability::RegexSearch);
        assert_eq!(selection.engine_name, "regex");

        let r = s
            .execute(Operation::Replace, &path, r"return (\d+)", Some("return $1 + 1"), &opts)
            .expect("valid request");
        assert!(r.success(), "{r:?}");
        assert_eq!(r.metadata["engine_used"], json!("regex"));
        let after = read(&path);
        assert!(after.contains("return 1 + 1") && after.contains("return 2 + 1"), "{after}");
        assert!(!after.contains('$'));

        let tree = ExecuteOptions {
            required_capabilities: vec!["tree-aware".to_owned()],
            language: Some("python".to_owned()),
            ..ExecuteOptions::default()
        };
        let selection = s.explain(Operation::Delete, "def two", None, &tree);
        assert_eq!(selection.primary, Capability::StructuralSearch);
        assert_eq!(selection.engine_name, "block");
    }

    #[test]
    fn test_regex_mode_compiles_dot_as_wildcard() {
        let (_dir, s, path) = setup("w.txt", "fooXbar\n");
        let opts = ExecuteOptions {
            regex_mode: true,
            ..ExecuteOptions::default()
        };
        let r = s.execute(Operation::Search, &path, "foo.bar", None, &opts).expect("ok");
        assert!(r.success(), "{r:?}");
        assert_eq!(r.operation_count, 1);
        assert_eq!(r.matches[0].text, "fooXbar");

        let plain = s
            .execute(Operation::Search, &path, "foo.bar", None, &ExecuteOptions::default())
            .expect("ok");
        assert_eq!(plain.metadata["error_kind"], json!("pattern_not_found"));
    }

    #[test]
    fn test_delete_runs_through_engine_primitive() {
        let (_dir, s, path) = setup("d.py", "import os\nimport sys\n");
        let r = s
            .execute(Operation::Delete, &path, "import sys", None, &ExecuteOptions::default())
            .expect("ok");
        assert!(r.success(), "{r:?}");
        assert_eq!(read(&path), "import os\n");
        let engine = s.registry().get("literal").expect("literal registered");
        assert_eq!(engine.metrics("delete").map(|m| m.calls), Some(1));
        assert_eq!(r.metadata["deletions"][0]["start_line"], json!(2));
    }

    #[test]
    fn test_confine_keeps_paths_inside_workspace() {
        let (dir, s, _path) = setup("inside.py", "x = 1\n");
        let root = dir.path().canonicalize().expect("canonical");

        assert_eq!(s.confine(Path::new("inside.py")).expect("inside"), root.join("inside.py"));
        assert_eq!(
            s.confine(Path::new("./new/dir/../file.py")).expect("not yet created"),
            root.join("new/file.py")
        );
        assert_eq!(
            s.confine(&root.join("inside.py")).expect("absolute inside"),
            root.join("inside.py")
        );
        for escape in ["../outside.py", "new/../../x", "/etc/passwd"] {
            assert!(
                matches!(s.confine(Path::new(escape)), Err(SurgeonError::OutsideWorkspace { .. })),
                "{escape}"
            );
        }
        assert!(matches!(
            s.confine(Path::new("a\0b")),
            Err(SurgeonError::InvalidRequest(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_confine_follows_symlinks() {
        let outside = tempfile::tempdir().expect("tempdir");
        let (dir, s, _path) = setup("a.py", "x\n");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).expect("symlink");
        assert!(matches!(
            s.confine(Path::new("link/new.py")),
            Err(SurgeonError::OutsideWorkspace { .. })
        ));
    }

    #[test]
    fn test_operation_names() {
        assert_eq!("insert-after".parse::<Operation>(), Ok(Operation::InsertAfter));
        assert_eq!("REMOVE".parse::<Operation>(), Ok(Operation::Delete));
        assert!("explode".parse::<Operation>().is_err());
        assert_eq!(Operation::Append.kind(), OperationKind::InsertAfter);
    }

    #[test]
    fn test_result_json_has_success_flag() {
        let r = OperationResult::new(OperationStatus::PartialSuccess, "x");
        let v = r.to_json();
        assert_eq!(v["success"], json!(false));
        assert_eq!(v["status"], json!("partial_success"));
    }
}
