//! Plain substring matching.
//!
//! Worst case is O(n*m): a forward scan with no backtracking. Case-insensitive
//! search compares char by char with Unicode lowercasing, so offsets always
//! point into the original text.

use crate::error::SurgeonResult;

use super::{Match, MatchOptions, Matcher, PatternFlavor, on_word_boundary, satisfies_anchor};

#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralMatcher;

impl LiteralMatcher {
    pub const fn new() -> Self {
        Self
    }

    /// Number of non-overlapping occurrences honouring `opts`.
    pub fn count(&self, text: &str, pattern: &str, opts: &MatchOptions) -> usize {
        self.scan(text, pattern, opts).len()
    }

    /// Run several patterns over the same text, keeping input order.
    pub fn find_many(
        &self,
        text: &str,
        patterns: &[&str],
        opts: &MatchOptions,
    ) -> Vec<(String, Vec<Match>)> {
        patterns
            .iter()
            .map(|p| ((*p).to_owned(), self.scan(text, p, opts)))
            .collect()
    }

    fn scan(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Vec<Match> {
        let mut out = Vec::new();
        if pattern.is_empty() {
            return out;
        }
        let limit = opts.limit.unwrap_or(usize::MAX);
        let mut from = 0;

        while from <= text.len() && out.len() < limit {
            let Some((start, end)) = next_occurrence(text, pattern, from, opts.case_sensitive) else {
                break;
            };
            let accepted = (!opts.whole_word || on_word_boundary(text, start, end))
                && satisfies_anchor(text, start, end, opts.anchor);
            if accepted {
                out.push(Match::at(text, start, end));
                from = end;
            } else {
                // Step one char so overlapping candidates still get a chance.
                from = start + text[start..].chars().next().map_or(1, char::len_utf8);
            }
        }
        out
    }
}

impl Matcher for LiteralMatcher {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn find(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Option<Match>> {
        let opts = MatchOptions {
            limit: Some(1),
            ..opts.clone()
        };
        Ok(self.scan(text, pattern, &opts).into_iter().next())
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Vec<Match>> {
        Ok(self.scan(text, pattern, opts))
    }

    fn rewrite_for(&self, pattern: &str, flavor: PatternFlavor) -> String {
        match flavor {
            PatternFlavor::Literal | PatternFlavor::AstGrep => pattern.to_owned(),
            PatternFlavor::Regex => regex::escape(pattern),
        }
    }
}

/// Byte span of the next occurrence at or after `from`.
fn next_occurrence(
    text: &str,
    pattern: &str,
    from: usize,
    case_sensitive: bool,
) -> Option<(usize, usize)> {
    if case_sensitive {
        return text[from..]
            .find(pattern)
            .map(|i| (from + i, from + i + pattern.len()));
    }

    for (offset, _) in text[from..].char_indices() {
        let start = from + offset;
        if let Some(end) = caseless_prefix(&text[start..], pattern) {
            return Some((start, start + end));
        }
    }
    None
}

/// Byte length of the prefix of `hay` that equals `needle` ignoring case.
fn caseless_prefix(hay: &str, needle: &str) -> Option<usize> {
    let mut hay_chars = hay.char_indices();
    let mut consumed = 0;
    for n in needle.chars() {
        let (i, h) = hay_chars.next()?;
        if !h.to_lowercase().eq(n.to_lowercase()) {
            return None;
        }
        consumed = i + h.len_utf8();
    }
    Some(consumed)
}
