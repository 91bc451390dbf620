//! Atomic file writing via tempfile + rename.
//!
//! The new content goes to a [`tempfile::NamedTempFile`] in the target's own
//! directory and is then persisted over the target, so a crash mid-write never
//! leaves a half-edited source file behind. The original file's permissions
//! are carried over to the replacement.

use std::io::Write;
use std::path::Path;

use crate::error::{SurgeonError, SurgeonResult};

/// Atomically replace `path` with `content`.
///
/// # Errors
///
/// A classified [`SurgeonError::FileSystem`] if the parent directory is
/// missing, the temp file cannot be written, or the rename fails.
pub fn atomic_write(path: &Path, content: &str) -> SurgeonResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| SurgeonError::fs(parent, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| SurgeonError::fs(path, e))?;
    tmp.flush().map_err(|e| SurgeonError::fs(path, e))?;

    if let Ok(meta) = std::fs::metadata(path) {
        // Best effort: a failure here still leaves correct content.
        let _ = std::fs::set_permissions(tmp.path(), meta.permissions());
    }

    tmp.persist(path).map_err(|e| SurgeonError::fs(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.py");
        std::fs::write(&path, "old\n").expect("seed");
        atomic_write(&path, "new\n").expect("write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "new\n");
        // No temp files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 1);
    }

    #[test]
    fn test_missing_parent_is_classified() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("no/such/dir/a.py");
        let err = atomic_write(&path, "x").expect_err("no parent");
        assert_eq!(err.kind_tag(), "file_not_found");
    }
}
