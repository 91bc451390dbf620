//! Pattern matchers: literal, regex and fuzzy.
//!
//! All three implement [`Matcher`] so engines can swap them freely. Each also
//! knows how to rewrite its pattern for a more capable backend (see
//! [`PatternFlavor`]), which is how the same caller code upgrades to
//! structural search when an ast-grep backend is in play.
//!
//! Offsets in [`Match`] are byte offsets into the searched text and always
//! fall on char boundaries.

pub mod fuzzy;
pub mod levenshtein;
pub mod library;
pub mod literal;
pub mod regexp;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::SurgeonResult;

pub use fuzzy::FuzzyMatcher;
pub use literal::LiteralMatcher;
pub use regexp::RegexMatcher;

/// One located occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub text: String,
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Option<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub named_groups: BTreeMap<String, String>,
    /// 1-based line of `start`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// 1-based column of `start`, in chars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    /// Fuzzy matches only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl Match {
    /// Build a match over `source[start..end]` with its line and column filled in.
    pub fn at(source: &str, start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= source.len());
        let (line, column) = line_col(source, start);
        Self {
            text: source[start..end].to_owned(),
            start,
            end,
            groups: Vec::new(),
            named_groups: BTreeMap::new(),
            line: Some(line),
            column: Some(column),
            similarity: None,
        }
    }

    #[must_use]
    pub const fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Where a literal or regex match must sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TextStart,
    TextEnd,
    LineStart,
    LineEnd,
}

/// Knobs shared by every matcher. Matchers ignore the ones they have no use for.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub anchor: Option<Anchor>,
    /// `^`/`$` match at line boundaries (regex).
    pub multi_line: bool,
    /// `.` matches newlines (regex).
    pub dot_all: bool,
    /// Escape literal-looking regex input before compiling.
    pub auto_escape: bool,
    /// Minimum similarity for fuzzy matches.
    pub threshold: Option<f64>,
    /// Stop after this many matches.
    pub limit: Option<usize>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            whole_word: false,
            anchor: None,
            multi_line: false,
            dot_all: false,
            auto_escape: true,
            threshold: None,
            limit: None,
        }
    }
}

/// Template dialect a pattern is rewritten into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFlavor {
    Literal,
    Regex,
    AstGrep,
}

/// Common contract of the literal, regex and fuzzy matchers.
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// First match, if any.
    fn find(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Option<Match>>;

    /// Every non-overlapping match, in order, up to `opts.limit`.
    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Vec<Match>>;

    fn is_match(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<bool> {
        Ok(self.find(text, pattern, opts)?.is_some())
    }

    /// Rewrite `pattern` into the dialect of the backend this matcher is bound to.
    fn rewrite_for(&self, pattern: &str, flavor: PatternFlavor) -> String;
}

/// 1-based (line, column) of a byte offset. Column counts chars.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

/// Word characters for whole-word checks.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True when `text[start..end]` is not glued to adjacent word characters.
pub(crate) fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start].chars().next_back().is_none_or(|c| !is_word_char(c));
    let after_ok = text[end..].chars().next().is_none_or(|c| !is_word_char(c));
    before_ok && after_ok
}

/// True when the span satisfies the requested anchor.
pub(crate) fn satisfies_anchor(text: &str, start: usize, end: usize, anchor: Option<Anchor>) -> bool {
    match anchor {
        None => true,
        Some(Anchor::TextStart) => start == 0,
        Some(Anchor::TextEnd) => end == text.len(),
        Some(Anchor::LineStart) => start == 0 || text[..start].ends_with('\n'),
        Some(Anchor::LineEnd) => {
            end == text.len() || text[end..].starts_with('\n') || text[end..].starts_with("\r\n")
        }
    }
}
