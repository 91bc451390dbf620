//! Error types for the surgical-modifier crate.

use std::path::PathBuf;

use serde::Serialize;

/// Classification hint attached to file system failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FsErrorKind {
    FileNotFound,
    PermissionError,
    EncodingError,
    IoError,
}

impl FsErrorKind {
    /// Classify an I/O error.
    pub fn classify(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionError,
            std::io::ErrorKind::InvalidData => Self::EncodingError,
            _ => Self::IoError,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileNotFound => "file_not_found",
            Self::PermissionError => "permission_error",
            Self::EncodingError => "encoding_error",
            Self::IoError => "io_error",
        }
    }
}

impl std::fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Surgeon error types.
#[derive(Debug, thiserror::Error)]
pub enum SurgeonError {
    /// The target pattern does not occur in the file.
    #[error("pattern not found in {path}: {pattern:?}")]
    PatternNotFound { path: PathBuf, pattern: String },

    /// Malformed regex syntax; carries the parser's message.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Missing file, permission denied, or undecodable content.
    #[error("{kind} on {path}: {source}")]
    FileSystem {
        path: PathBuf,
        kind: FsErrorKind,
        #[source]
        source: std::io::Error,
    },

    /// No registered engine by that name, or the engine's external tool is missing.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine does not implement the requested operation.
    #[error("engine {engine} does not support {operation}")]
    UnsupportedOperation { engine: String, operation: String },

    /// The edited file failed its structural re-check.
    #[error("post-mutation validation failed for {path}: {}", issues.join("; "))]
    PostMutationValidation { path: PathBuf, issues: Vec<String> },

    /// Snapshot could not be written or restored.
    #[error("backup failed for {path}: {reason}")]
    Backup { path: PathBuf, reason: String },

    /// A second registration under an existing engine name.
    #[error("engine already registered: {0}")]
    DuplicateEngine(String),

    /// Caller passed arguments that can never succeed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The path resolves to somewhere outside the workspace root.
    #[error("path escapes workspace: {path}")]
    OutsideWorkspace { path: PathBuf },

    /// Configuration value out of range or unparsable.
    #[error("config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SurgeonError {
    /// Wrap an I/O error with its path and classification.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            kind: FsErrorKind::classify(&source),
            source,
        }
    }

    /// Short machine-readable tag used in result metadata.
    pub const fn kind_tag(&self) -> &'static str {
        match self {
            Self::PatternNotFound { .. } => "pattern_not_found",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::FileSystem { kind, .. } => kind.as_str(),
            Self::EngineUnavailable(_) => "engine_unavailable",
            Self::UnsupportedOperation { .. } => "not_supported",
            Self::PostMutationValidation { .. } => "validation_failed",
            Self::Backup { .. } => "backup_failed",
            Self::DuplicateEngine(_) => "duplicate_engine",
            Self::InvalidRequest(_) => "invalid_request",
            Self::OutsideWorkspace { .. } => "outside_workspace",
            Self::Config(_) => "config_error",
            Self::Json(_) => "json_error",
        }
    }
}

/// Convenience result type for surgeon operations.
pub type SurgeonResult<T> = Result<T, SurgeonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_io_errors() {
        let nf = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(FsErrorKind::classify(&nf), FsErrorKind::FileNotFound);
        let pd = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(FsErrorKind::classify(&pd).as_str(), "permission_error");
        let bad = std::io::Error::from(std::io::ErrorKind::InvalidData);
        assert_eq!(FsErrorKind::classify(&bad).as_str(), "encoding_error");
    }

    #[test]
    fn test_fs_error_message_names_path() {
        let err = SurgeonError::fs(
            "/tmp/missing.py",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.kind_tag(), "file_not_found");
        assert!(err.to_string().contains("/tmp/missing.py"));
    }
}
