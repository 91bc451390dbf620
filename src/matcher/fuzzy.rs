//! Approximate matching by sequence similarity.
//!
//! Candidates are runs of whole words first: a pattern of `k` words is scored
//! against every window of `k` consecutive words in the text. Only when no
//! word window clears the threshold does the matcher fall back to sliding a
//! window of the pattern's char length across the raw text.
//!
//! The primary score is the sequence ratio (`2*M / T` over matching chars);
//! [`FuzzyMatcher::breakdown`] adds the edit-distance score and shared-word
//! ratio for callers that want to explain a match.

use std::collections::BTreeSet;

use serde::Serialize;
use similar::TextDiff;

use crate::error::SurgeonResult;

use super::library::whitespace_tolerant_regex;
use super::{Match, MatchOptions, Matcher, PatternFlavor, is_word_char, levenshtein};

pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Upper bound on raw windows examined by the fallback scan.
const MAX_FALLBACK_WINDOWS: usize = 200_000;

/// A did-you-mean candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub text: String,
    pub similarity: f64,
    pub line: usize,
}

/// Per-metric similarity of two strings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityBreakdown {
    pub sequence_ratio: f64,
    pub edit_distance_score: f64,
    pub word_overlap: f64,
    pub combined: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatcher {
    threshold: f64,
}

impl FuzzyMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Sequence ratio in `0.0..=1.0`.
    pub fn ratio(a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        f64::from(TextDiff::from_chars(a, b).ratio())
    }

    pub fn breakdown(a: &str, b: &str) -> SimilarityBreakdown {
        let sequence_ratio = Self::ratio(a, b);
        let edit_distance_score = levenshtein::similarity(a, b);

        let words_a: BTreeSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
        let words_b: BTreeSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
        let union = words_a.union(&words_b).count();
        let word_overlap = if union == 0 {
            1.0
        } else {
            words_a.intersection(&words_b).count() as f64 / union as f64
        };

        SimilarityBreakdown {
            sequence_ratio,
            edit_distance_score,
            word_overlap,
            combined: (sequence_ratio + edit_distance_score + word_overlap) / 3.0,
        }
    }

    /// The `n` closest word windows to `pattern`, best first, regardless of threshold.
    pub fn suggestions(&self, text: &str, pattern: &str, n: usize) -> Vec<Suggestion> {
        let mut seen = BTreeSet::new();
        let mut scored: Vec<(f64, usize, usize)> = word_windows(text, pattern)
            .into_iter()
            .filter_map(|(start, end)| {
                let candidate = &text[start..end];
                if !seen.insert(candidate.to_owned()) {
                    return None;
                }
                let score = self.score(candidate, pattern, false);
                (score > 0.0).then_some((score, start, end))
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(n)
            .map(|(similarity, start, end)| Suggestion {
                text: text[start..end].to_owned(),
                similarity,
                line: text[..start].matches('\n').count() + 1,
            })
            .collect()
    }

    fn score(&self, candidate: &str, pattern: &str, case_sensitive: bool) -> f64 {
        if case_sensitive {
            Self::ratio(candidate, pattern)
        } else {
            Self::ratio(&candidate.to_lowercase(), &pattern.to_lowercase())
        }
    }

    /// All candidates at or above the threshold, best first.
    fn candidates(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Vec<(f64, usize, usize)> {
        let threshold = opts.threshold.unwrap_or(self.threshold);
        let normalized = pattern.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(f64, usize, usize)> = word_windows(text, pattern)
            .into_iter()
            .filter_map(|(start, end)| {
                let window = text[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
                let s = self.score(&window, &normalized, opts.case_sensitive);
                (s >= threshold).then_some((s, start, end))
            })
            .collect();

        if hits.is_empty() {
            hits = char_windows(text, pattern.chars().count())
                .filter_map(|(start, end)| {
                    let s = self.score(&text[start..end], pattern, opts.case_sensitive);
                    (s >= threshold).then_some((s, start, end))
                })
                .collect();
        }

        hits.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        hits
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Matcher for FuzzyMatcher {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn find(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Option<Match>> {
        Ok(self
            .candidates(text, pattern, opts)
            .into_iter()
            .next()
            .map(|(score, start, end)| Match::at(text, start, end).with_similarity(score)))
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Vec<Match>> {
        let limit = opts.limit.unwrap_or(usize::MAX);
        let mut chosen: Vec<(f64, usize, usize)> = Vec::new();
        for (score, start, end) in self.candidates(text, pattern, opts) {
            if chosen.len() >= limit {
                break;
            }
            if chosen.iter().all(|&(_, s, e)| end <= s || start >= e) {
                chosen.push((score, start, end));
            }
        }
        chosen.sort_by_key(|&(_, start, _)| start);
        Ok(chosen
            .into_iter()
            .map(|(score, start, end)| Match::at(text, start, end).with_similarity(score))
            .collect())
    }

    fn rewrite_for(&self, pattern: &str, flavor: PatternFlavor) -> String {
        match flavor {
            PatternFlavor::Regex => whitespace_tolerant_regex(pattern),
            PatternFlavor::Literal | PatternFlavor::AstGrep => pattern.trim().to_owned(),
        }
    }
}

/// Byte spans of every word in `text`.
fn words(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (is_word_char(c), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Spans covering `k` consecutive words, where `k` is the pattern's word count.
fn word_windows(text: &str, pattern: &str) -> Vec<(usize, usize)> {
    let k = words(pattern).len().max(1);
    let spans = words(text);
    if spans.len() < k {
        return Vec::new();
    }
    spans
        .windows(k)
        .map(|w| (w[0].0, w[k - 1].1))
        .collect()
}

/// Spans of exactly `len` chars, starting at every char boundary.
fn char_windows(text: &str, len: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let count = if len == 0 || bounds.len() <= len {
        0
    } else {
        bounds.len() - len
    };
    (0..count.min(MAX_FALLBACK_WINDOWS)).map(move |i| (bounds[i], bounds[i + len]))
}
