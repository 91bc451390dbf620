//! Backend engines: pluggable implementations of search and mutate.
//!
//! An engine only has to provide `search` and `replace`. Line-oriented
//! insertion and deletion come for free from the default methods, which work
//! on whatever spans `search` returns. Engines are pure: content in, content
//! out. Touching the file system is the caller's job.

pub mod ast_grep;
pub mod block;
pub mod fuzzy;
pub mod instrument;
pub mod literal;
pub mod regexp;
pub mod registry;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::capability::{CapabilitySet, OperationKind};
use crate::error::SurgeonResult;
use crate::matcher::{Match, MatchOptions};
use crate::structure::{self, indentation, is_blank};

pub use instrument::{InstrumentedEngine, OperationMetrics, PerformanceSummary};
pub use registry::{EngineParams, Registry};

/// Per-call knobs handed to an engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOptions {
    /// Treat the pattern as a regular expression.
    pub regex: bool,
    pub matching: MatchOptions,
    /// Language of the content, when known.
    pub language: Option<String>,
}

/// Result of a content-rewriting primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub content: String,
    pub matches: Vec<Match>,
    /// Number of edit sites applied.
    pub count: usize,
}

impl EditOutcome {
    pub fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_owned(),
            matches: Vec::new(),
            count: 0,
        }
    }
}

/// Static self-description of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineDescriptor {
    pub name: String,
    pub capabilities: CapabilitySet,
    /// Empty means universal.
    pub languages: Vec<String>,
    pub available: bool,
}

pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    /// Languages this engine is specialised for. Empty means any.
    fn supported_languages(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the engine can run right now (external tools present, etc).
    fn is_available(&self) -> bool {
        true
    }

    fn supports_operation(&self, _kind: OperationKind) -> bool {
        true
    }

    fn supports_language(&self, language: &str) -> bool {
        let langs = self.supported_languages();
        langs.is_empty() || langs.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    fn descriptor(&self) -> EngineDescriptor {
        EngineDescriptor {
            name: self.name().to_owned(),
            capabilities: self.capabilities(),
            languages: self
                .supported_languages()
                .iter()
                .map(|l| (*l).to_owned())
                .collect(),
            available: self.is_available(),
        }
    }

    fn search(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<Vec<Match>>;

    fn replace(
        &self,
        content: &str,
        pattern: &str,
        replacement: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome>;

    /// Insert `text` as new lines above each matched line, indented like it.
    fn insert_before(
        &self,
        content: &str,
        pattern: &str,
        text: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        let matches = self.search(content, pattern, opts)?;
        Ok(insert_lines(content, matches, text, Placement::Before))
    }

    /// Insert `text` as new lines below each matched line, indented like it.
    fn insert_after(
        &self,
        content: &str,
        pattern: &str,
        text: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        let matches = self.search(content, pattern, opts)?;
        Ok(insert_lines(content, matches, text, Placement::After))
    }

    /// Remove each matched line, widened to the whole block when the line
    /// heads a definition. See [`crate::ops::delete::plan`].
    fn delete(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<EditOutcome> {
        let matches = self.search(content, pattern, opts)?;
        let plan = crate::ops::delete::plan(content, &matches);
        Ok(EditOutcome {
            count: plan.count(),
            content: plan.content,
            matches,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

/// Insert `text` relative to the lines touched by `matches`.
///
/// Each anchor line is used once even if several matches land on it. Edits
/// are applied bottom-up so earlier offsets stay valid.
pub fn insert_lines(content: &str, matches: Vec<Match>, text: &str, placement: Placement) -> EditOutcome {
    if matches.is_empty() {
        return EditOutcome::unchanged(content);
    }
    let lines = structure::lines(content);
    if lines.is_empty() {
        let mut out = text.to_owned();
        out.push_str(content);
        return EditOutcome {
            content: out,
            matches,
            count: 1,
        };
    }
    let nl = structure::newline_of(content);

    let anchors: BTreeSet<usize> = matches
        .iter()
        .map(|m| {
            let at = match placement {
                Placement::Before => m.start,
                Placement::After => m.end.saturating_sub(1).max(m.start),
            };
            structure::line_index(&lines, at)
        })
        .collect();

    let mut out = content.to_owned();
    for &idx in anchors.iter().rev() {
        let line = lines[idx];
        let indent = indentation(&content[line.start..line.end]);
        let block = reindent(text, indent, nl);
        match placement {
            Placement::Before => out.insert_str(line.start, &format!("{block}{nl}")),
            Placement::After => out.insert_str(line.end, &format!("{nl}{block}")),
        }
    }

    EditOutcome {
        content: out,
        count: anchors.len(),
        matches,
    }
}

/// Replace each match with `replacement`, verbatim. Matches must be sorted and disjoint.
pub fn splice(content: &str, matches: &[Match], replacement: &str) -> String {
    splice_with(content, matches, |_| replacement.to_owned())
}

/// Replace each match with whatever `render` produces for it.
pub fn splice_with(content: &str, matches: &[Match], mut render: impl FnMut(&Match) -> String) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for m in matches {
        if m.start < last {
            continue;
        }
        out.push_str(&content[last..m.start]);
        out.push_str(&render(m));
        last = m.end;
    }
    out.push_str(&content[last..]);
    out
}

/// Strip the common leading indentation of `text`'s non-blank lines.
pub fn dedent(text: &str) -> String {
    let common = text
        .lines()
        .filter(|l| !is_blank(l))
        .map(|l| indentation(l).len())
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|l| if is_blank(l) { "" } else { l.get(common..).unwrap_or_else(|| l.trim_start()) })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Dedent `text`, then prefix every non-blank line with `indent`.
pub fn reindent(text: &str, indent: &str, nl: &str) -> String {
    dedent(text)
        .split('\n')
        .map(|l| if l.is_empty() { String::new() } else { format!("{indent}{l}") })
        .collect::<Vec<_>>()
        .join(nl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(content: &str, needle: &str) -> Match {
        let start = content.find(needle).expect("needle present");
        Match::at(content, start, start + needle.len())
    }

    #[test]
    fn test_insert_after_keeps_indent() {
        let content = "def f():\n    x = 1\n    return x\n";
        let out = insert_lines(content, vec![m(content, "x = 1")], "y = 2", Placement::After);
        assert_eq!(out.content, "def f():\n    x = 1\n    y = 2\n    return x\n");
        assert_eq!(out.count, 1);
    }

    #[test]
    fn test_insert_before_multiline_text() {
        let content = "a\n  b\n";
        let out = insert_lines(content, vec![m(content, "b")], "    one\n      two", Placement::Before);
        assert_eq!(out.content, "a\n  one\n    two\n  b\n");
    }

    #[test]
    fn test_insert_after_last_line_without_newline() {
        let content = "import os\nimport sys";
        let out = insert_lines(content, vec![m(content, "import sys")], "import json", Placement::After);
        assert_eq!(out.content, "import os\nimport sys\nimport json");
    }

    #[test]
    fn test_insert_preserves_crlf() {
        let content = "a\r\nb\r\n";
        let out = insert_lines(content, vec![m(content, "a")], "z", Placement::After);
        assert_eq!(out.content, "a\r\nz\r\nb\r\n");
    }

    #[test]
    fn test_anchor_line_used_once() {
        let content = "x x\ny\n";
        let matches = vec![Match::at(content, 0, 1), Match::at(content, 2, 3)];
        let out = insert_lines(content, matches, "new", Placement::Before);
        assert_eq!(out.content, "new\nx x\ny\n");
        assert_eq!(out.count, 1);
    }

    #[test]
    fn test_splice() {
        let content = "a-b-c";
        let matches = vec![Match::at(content, 1, 2), Match::at(content, 3, 4)];
        assert_eq!(splice(content, &matches, "+"), "a+b+c");
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("    a\n      b\n\n    c"), "a\n  b\n\nc");
    }
}
