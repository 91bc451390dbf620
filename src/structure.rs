//! Indentation-based code structure.
//!
//! Blocks are found by comparing indentation, not by parsing: a header line
//! owns every following non-blank line that is indented deeper than itself,
//! plus decorators sitting directly above it. This works the same for Python,
//! YAML-ish configs and brace languages (a closing brace at the header's
//! indentation ends the block and belongs to it).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::complexity::indent_width;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?|export|default|static|public|private|protected|async|unsafe|const|abstract|final)\s+)*(?:def|class|fn|function|func|struct|enum|impl|trait|interface|mod)\b",
    )
    .expect("BUG: block header pattern is invalid")
});

static PY_OPENER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:async\s+)?(?:def|class|if|elif|else|for|while|with|try|except|finally|match|case)\b[^#]*:\s*(?:#.*)?$",
    )
    .expect("BUG: python block opener pattern is invalid")
});

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("BUG: call pattern is invalid")
});

static DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:def|fn|function|func|class|struct)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("BUG: definition pattern is invalid")
});

/// Words that look like calls but are control flow or declarations.
const NOT_CALLS: &[&str] = &[
    "if", "elif", "while", "for", "switch", "match", "return", "def", "fn", "function", "func",
    "class", "struct", "catch", "with", "assert", "await", "yield", "print", "lambda", "not", "and",
    "or", "in", "is", "super", "self", "Some", "Ok", "Err",
];

/// One physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    /// Offset of the first byte.
    pub start: usize,
    /// Offset just past the last content byte (before `\r\n` / `\n`).
    pub end: usize,
    /// Offset where the next line begins (`content.len()` on the last line).
    pub next: usize,
}

/// Split `content` into lines. A trailing newline does not create an extra line.
pub fn lines(content: &str) -> Vec<Line> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < content.len() {
        let (end, next) = match content[start..].find('\n') {
            Some(i) => {
                let nl = start + i;
                let end = if nl > start && content.as_bytes()[nl - 1] == b'\r' {
                    nl - 1
                } else {
                    nl
                };
                (end, nl + 1)
            }
            None => (content.len(), content.len()),
        };
        out.push(Line { start, end, next });
        start = next;
    }
    out
}

/// Index of the line containing byte `offset`.
pub fn line_index(lines: &[Line], offset: usize) -> usize {
    lines
        .partition_point(|l| l.next <= offset)
        .min(lines.len().saturating_sub(1))
}

/// The newline convention used by `content`.
pub fn newline_of(content: &str) -> &'static str {
    if content.contains("\r\n") { "\r\n" } else { "\n" }
}

/// Leading whitespace of a line.
pub fn indentation(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

pub fn is_comment(line: &str) -> bool {
    let t = line.trim_start();
    (t.starts_with('#') && !t.starts_with("#[")) || t.starts_with("//")
}

pub fn is_decorator(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('@') || t.starts_with("#[")
}

/// Whether a line starts a function, class or similar definition.
pub fn is_block_header(line: &str) -> bool {
    HEADER_RE.is_match(line)
}

/// Inclusive range of lines making up a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockSpan {
    pub start_line: usize,
    pub header_line: usize,
    pub end_line: usize,
}

impl BlockSpan {
    /// Byte range covering whole lines, including the final line break.
    pub const fn byte_range(&self, lines: &[Line]) -> (usize, usize) {
        (lines[self.start_line].start, lines[self.end_line].next)
    }

    pub const fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// Expand the line at `anchor` to the block it heads.
///
/// A decorator anchor is resolved to the definition below it. A line that
/// heads nothing yields a single-line span.
pub fn block_span(content: &str, lines: &[Line], anchor: usize) -> BlockSpan {
    let text = |i: usize| &content[lines[i].start..lines[i].end];

    let mut header = anchor;
    if is_decorator(text(anchor)) {
        let mut i = anchor + 1;
        while i < lines.len() && (is_decorator(text(i)) || is_blank(text(i)) || is_comment(text(i))) {
            i += 1;
        }
        if i < lines.len() && is_block_header(text(i)) {
            header = i;
        }
    }

    if !is_block_header(text(header)) {
        return BlockSpan {
            start_line: anchor,
            header_line: anchor,
            end_line: anchor,
        };
    }

    BlockSpan {
        start_line: decorated_start(content, lines, header),
        header_line: header,
        end_line: block_end(content, lines, header),
    }
}

/// Last line of the block headed by `header`. Trailing blank lines are excluded.
pub fn block_end(content: &str, lines: &[Line], header: usize) -> usize {
    let text = |i: usize| &content[lines[i].start..lines[i].end];
    let base = indent_width(text(header));
    let mut end = header;

    for i in header + 1..lines.len() {
        let line = text(i);
        if is_blank(line) {
            continue;
        }
        let width = indent_width(line);
        if width > base {
            end = i;
            continue;
        }
        let t = line.trim_start();
        if width == base && t.starts_with(['}', ')', ']']) {
            end = i;
            // `) -> int:` or `) {` continues the header rather than closing it.
            if t.trim_end().ends_with([':', '{']) {
                continue;
            }
        }
        break;
    }
    end
}

/// First line of the decorator run directly above `header`, or `header` itself.
pub fn decorated_start(content: &str, lines: &[Line], header: usize) -> usize {
    let text = |i: usize| &content[lines[i].start..lines[i].end];
    let mut start = header;
    let mut i = header;
    while i > 0 {
        i -= 1;
        let line = text(i);
        if is_decorator(line) {
            start = i;
        } else if !(is_blank(line) || is_comment(line)) {
            break;
        }
    }
    start
}

/// Informational findings about a block slated for deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    /// Called inside the block; defined in the file before, but nowhere after.
    pub orphaned_calls: Vec<String>,
    /// Defined inside the block but still called by the remaining code.
    pub dangling_references: Vec<String>,
}

impl DependencyReport {
    pub fn is_empty(&self) -> bool {
        self.orphaned_calls.is_empty() && self.dangling_references.is_empty()
    }
}

/// Best-effort cross-reference between a removed block and what remains.
pub fn dependency_check(original: &str, removed: &str, remaining: &str) -> DependencyReport {
    let defined = |s: &str| -> BTreeSet<String> {
        DEFINITION_RE
            .captures_iter(s)
            .map(|c| c[1].to_owned())
            .collect()
    };
    let called = |s: &str| -> BTreeSet<String> {
        CALL_RE
            .captures_iter(s)
            .map(|c| c[1].to_owned())
            .filter(|n| !NOT_CALLS.contains(&n.as_str()))
            .collect()
    };

    let defined_before = defined(original);
    let defined_after = defined(remaining);
    let defined_in_block = defined(removed);
    let calls_after = called(remaining);

    let orphaned_calls = called(removed)
        .into_iter()
        .filter(|n| defined_before.contains(n) && !defined_after.contains(n))
        .filter(|n| !defined_in_block.contains(n) || calls_after.contains(n))
        .collect();
    let dangling_references = defined_in_block
        .into_iter()
        .filter(|n| calls_after.contains(n) && !defined_after.contains(n))
        .collect();

    DependencyReport {
        orphaned_calls,
        dangling_references,
    }
}

/// What kind of structural problem an [`Issue`] is, without its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueKind {
    Unclosed(char),
    Mismatched { close: char, open: char },
    Unmatched(char),
    MissingBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    /// 1-based line the problem shows up on.
    pub line: usize,
    /// Where the opener sat, for mismatched pairs.
    pub opened_at: Option<usize>,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.line;
        match self.kind {
            IssueKind::Unclosed(o) => write!(f, "unclosed '{o}' opened at line {line}"),
            IssueKind::Mismatched { close, open } => write!(
                f,
                "'{close}' at line {line} closes '{open}' opened at line {}",
                self.opened_at.unwrap_or(line)
            ),
            IssueKind::Unmatched(c) => write!(f, "unmatched '{c}' at line {line}"),
            IssueKind::MissingBody => write!(f, "block opened at line {line} has no indented body"),
        }
    }
}

/// Structural problems in `content`, as messages.
///
/// Checks delimiter balance outside strings and comments, and for Python
/// that every block opener is followed by an indented body.
pub fn validate(content: &str, language: Option<&str>) -> Vec<String> {
    issues(content, language).iter().map(ToString::to_string).collect()
}

/// Like [`validate`], keeping each issue's kind and position.
pub fn issues(content: &str, language: Option<&str>) -> Vec<Issue> {
    let mut found = delimiter_issues(content, language);
    if language == Some("python") {
        found.extend(python_body_issues(content));
    }
    found
}

/// Issues present after an edit that were not present before it.
///
/// Issues are compared by kind, ignoring line numbers, so code that merely
/// moved does not count. Each kind is reported as often as it occurs more
/// after the edit than before.
pub fn introduced_issues(before: &str, after: &str, language: Option<&str>) -> Vec<String> {
    let mut budget: BTreeMap<IssueKind, usize> = BTreeMap::new();
    for issue in issues(before, language) {
        *budget.entry(issue.kind).or_default() += 1;
    }
    issues(after, language)
        .into_iter()
        .filter(|issue| match budget.get_mut(&issue.kind) {
            Some(left) if *left > 0 => {
                *left -= 1;
                false
            }
            _ => true,
        })
        .map(|issue| issue.to_string())
        .collect()
}

/// Which line-comment markers a language uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommentStyle {
    hash: bool,
    slash: bool,
    /// `#[` and `#!` are code, not comments.
    hash_attributes: bool,
}

impl CommentStyle {
    fn of(language: Option<&str>) -> Self {
        let (hash, slash, hash_attributes) = match language {
            Some("python" | "ruby" | "bash" | "yaml" | "toml" | "nim" | "coffeescript" | "gdscript") => {
                (true, false, false)
            }
            Some(
                "rust" | "javascript" | "typescript" | "go" | "java" | "kotlin" | "c" | "cpp" | "csharp"
                | "swift",
            ) => (false, true, false),
            Some("json" | "html" | "css" | "lua") => (false, false, false),
            // php, and anything unrecognised.
            _ => (true, true, true),
        };
        Self {
            hash,
            slash,
            hash_attributes,
        }
    }

    fn starts_comment(self, chars: &[char], i: usize) -> bool {
        match chars[i] {
            '#' if self.hash => {
                !self.hash_attributes || chars.get(i + 1).is_none_or(|n| *n != '[' && *n != '!')
            }
            '/' => self.slash && chars.get(i + 1) == Some(&'/'),
            _ => false,
        }
    }
}

fn delimiter_issues(content: &str, language: Option<&str>) -> Vec<Issue> {
    let comments = CommentStyle::of(language);
    let lifetimes = language == Some("rust");
    let mut issues = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let chars: Vec<char> = content.chars().collect();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if comments.starts_comment(&chars, i) {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        match c {
            '\n' => line += 1,
            '"' | '\'' | '`' => {
                if c == '\'' && lifetimes && !is_char_literal(&chars, i) {
                    i += 1;
                    continue;
                }
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                let (end, newlines) = skip_string(&chars, i, c, triple);
                line += newlines;
                i = end;
                continue;
            }
            '(' | '[' | '{' => stack.push((c, line)),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((o, _)) if o == open => {}
                    Some((o, at)) => issues.push(Issue {
                        kind: IssueKind::Mismatched { close: c, open: o },
                        line,
                        opened_at: Some(at),
                    }),
                    None => issues.push(Issue {
                        kind: IssueKind::Unmatched(c),
                        line,
                        opened_at: None,
                    }),
                }
            }
            _ => {}
        }
        i += 1;
    }

    for (o, at) in stack {
        issues.push(Issue {
            kind: IssueKind::Unclosed(o),
            line: at,
            opened_at: None,
        });
    }
    issues
}

fn is_char_literal(chars: &[char], i: usize) -> bool {
    match chars.get(i + 1) {
        Some('\\') => chars[i + 2..].iter().take(8).any(|c| *c == '\''),
        Some(_) => chars.get(i + 2) == Some(&'\''),
        None => false,
    }
}

/// Returns the index just past the string and the number of newlines crossed.
fn skip_string(chars: &[char], start: usize, quote: char, triple: bool) -> (usize, usize) {
    let mut i = start + if triple { 3 } else { 1 };
    let mut newlines = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            if chars.get(i + 1) == Some(&'\n') {
                newlines += 1;
            }
            i += 2;
            continue;
        }
        if c == '\n' {
            if !triple && quote != '`' && quote != '"' {
                // Unterminated single-quoted string: stop at the line end.
                return (i, newlines);
            }
            newlines += 1;
        }
        if c == quote {
            if !triple {
                return (i + 1, newlines);
            }
            if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                return (i + 3, newlines);
            }
        }
        i += 1;
    }
    (i, newlines)
}

fn python_body_issues(content: &str) -> Vec<Issue> {
    let all: Vec<&str> = content.lines().collect();
    let mut issues = Vec::new();
    for (idx, line) in all.iter().enumerate() {
        if !PY_OPENER_RE.is_match(line) {
            continue;
        }
        let base = indent_width(line);
        let body = all[idx + 1..]
            .iter()
            .find(|l| !is_blank(l) && !is_comment(l));
        if body.is_none_or(|b| indent_width(b) <= base) {
            issues.push(Issue {
                kind: IssueKind::MissingBody,
                line: idx + 1,
                opened_at: None,
            });
        }
    }
    issues
}
