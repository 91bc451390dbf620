//! Unified diffs of an edit, using the `similar` crate.

use serde::Serialize;
use similar::{Algorithm, ChangeTag, TextDiff};

/// Patience unified diff between the original and edited content.
pub fn unified_diff(file_name: &str, old: &str, new: &str) -> String {
    TextDiff::configure()
        .algorithm(Algorithm::Patience)
        .diff_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{file_name}"), &format!("b/{file_name}"))
        .to_string()
}

/// Line counts touched by an edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
}

pub fn diff_stats(old: &str, new: &str) -> DiffStats {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Patience)
        .diff_lines(old, new);
    diff.iter_all_changes()
        .fold(DiffStats::default(), |mut stats, change| {
            match change.tag() {
                ChangeTag::Insert => stats.added += 1,
                ChangeTag::Delete => stats.removed += 1,
                ChangeTag::Equal => {}
            }
            stats
        })
}
