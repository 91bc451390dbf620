//! Line and block deletion.
//!
//! Each match selects the line it starts on. When that line heads a
//! definition the span grows to the whole indentation block plus any
//! decorators above it. Spans are merged, previewed against the original
//! text, then cut bottom to top so earlier offsets stay valid.

use serde::Serialize;

use crate::matcher::Match;
use crate::structure::{self, BlockSpan, DependencyReport, Line};

/// Lines of context kept on each side of a deleted span.
pub const CONTEXT_LINES: usize = 3;

/// One contiguous run of deleted lines. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionPreview {
    pub start_line: usize,
    pub end_line: usize,
    /// The span grew beyond the matched line to cover a block.
    pub expanded: bool,
    pub removed: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePlan {
    pub content: String,
    pub previews: Vec<DeletionPreview>,
    pub dependencies: DependencyReport,
}

impl DeletePlan {
    pub fn count(&self) -> usize {
        self.previews.len()
    }

    pub fn removed_lines(&self) -> usize {
        self.previews.iter().map(|p| p.end_line - p.start_line + 1).sum()
    }
}

/// Work out what deleting the lines under `matches` does to `content`.
pub fn plan(content: &str, matches: &[Match]) -> DeletePlan {
    let lines = structure::lines(content);
    if lines.is_empty() || matches.is_empty() {
        return DeletePlan {
            content: content.to_owned(),
            previews: Vec::new(),
            dependencies: DependencyReport::default(),
        };
    }

    let mut spans: Vec<(BlockSpan, bool)> = matches
        .iter()
        .map(|m| {
            let first = structure::line_index(&lines, m.start);
            let last = structure::line_index(&lines, m.end.saturating_sub(1).max(m.start));
            let mut span = structure::block_span(content, &lines, first);
            let expanded = span.start_line != first || span.end_line > last;
            span.end_line = span.end_line.max(last);
            (span, expanded)
        })
        .collect();
    spans.sort_by_key(|(s, _)| s.start_line);

    let mut merged: Vec<(BlockSpan, bool)> = Vec::with_capacity(spans.len());
    for (span, expanded) in spans {
        match merged.last_mut() {
            Some((prev, prev_expanded)) if span.start_line <= prev.end_line + 1 => {
                prev.end_line = prev.end_line.max(span.end_line);
                *prev_expanded |= expanded;
            }
            _ => merged.push((span, expanded)),
        }
    }

    let text = |i: usize| content[lines[i].start..lines[i].end].to_owned();
    let previews: Vec<DeletionPreview> = merged
        .iter()
        .map(|(span, expanded)| {
            let (from, to) = span.byte_range(&lines);
            DeletionPreview {
                start_line: span.start_line + 1,
                end_line: span.end_line + 1,
                expanded: *expanded,
                removed: content[from..to].to_owned(),
                context_before: (span.start_line.saturating_sub(CONTEXT_LINES)..span.start_line)
                    .map(text)
                    .collect(),
                context_after: (span.end_line + 1..lines.len().min(span.end_line + 1 + CONTEXT_LINES))
                    .map(text)
                    .collect(),
            }
        })
        .collect();

    let out = cut(content, &lines, merged.iter().map(|(s, _)| *s));
    let removed: String = previews.iter().map(|p| p.removed.as_str()).collect();
    let dependencies = structure::dependency_check(content, &removed, &out);

    DeletePlan {
        content: out,
        previews,
        dependencies,
    }
}

fn cut(content: &str, lines: &[Line], spans: impl DoubleEndedIterator<Item = BlockSpan>) -> String {
    let mut out = content.to_owned();
    for span in spans.rev() {
        let (from, to) = span.byte_range(lines);
        out.replace_range(from..to, "");
    }
    // Deleting the last line leaves the previous line's break dangling.
    if !content.ends_with('\n') {
        if let Some(rest) = out.strip_suffix('\n') {
            let keep = rest.strip_suffix('\r').unwrap_or(rest).len();
            out.truncate(keep);
        }
    }
    out
}
