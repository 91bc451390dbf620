//! Regex matching with a compile cache and literal auto-escape.
//!
//! Input that does not use any regex-only operator (`\ * + ? [ ] | ^ $ { }`)
//! is treated as literal text and escaped before compiling, so `print(x)` or
//! `foo.bar` search for exactly that text. Input that fails to compile but
//! carries at most two special characters gets the same treatment. Anything
//! else surfaces the parser's error as [`SurgeonError::InvalidPattern`].

use std::collections::HashMap;
use std::sync::Mutex;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::{SurgeonError, SurgeonResult};

use super::library::{common_pattern, regex_to_ast_grep};
use super::{Match, MatchOptions, Matcher, PatternFlavor, on_word_boundary, satisfies_anchor};

/// Characters that only make sense as regex operators.
const STRONG_META: &[char] = &['\\', '*', '+', '?', '[', ']', '|', '^', '$', '{', '}'];

/// Every character with special meaning to the regex parser.
const ALL_META: &[char] = &[
    '\\', '^', '$', '.', '|', '?', '*', '+', '(', ')', '[', ']', '{', '}',
];

/// Compile flags, part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegexFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_all: bool,
}

impl From<&MatchOptions> for RegexFlags {
    fn from(opts: &MatchOptions) -> Self {
        Self {
            case_insensitive: !opts.case_sensitive,
            multi_line: opts.multi_line,
            dot_all: opts.dot_all,
        }
    }
}

pub struct RegexMatcher {
    cache: Mutex<HashMap<(String, RegexFlags), Regex>>,
    capacity: usize,
}

impl RegexMatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Whether `pattern` reads as plain text rather than a regex.
    pub fn looks_literal(pattern: &str) -> bool {
        !pattern.contains(STRONG_META)
    }

    /// Compile `pattern` (or fetch it from the cache) under `opts`.
    pub fn compile(&self, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Regex> {
        let flags = RegexFlags::from(opts);
        let source = if opts.auto_escape && Self::looks_literal(pattern) {
            regex::escape(pattern)
        } else {
            pattern.to_owned()
        };

        let key = (source, flags);
        if let Some(re) = self.lock().get(&key) {
            return Ok(re.clone());
        }

        let re = match build(&key.0, flags) {
            Ok(re) => re,
            Err(err) => {
                let specials = pattern.chars().filter(|c| ALL_META.contains(c)).count();
                if opts.auto_escape && specials <= 2 {
                    debug!(pattern, "pattern failed to compile, retrying as literal");
                    build(&regex::escape(pattern), flags).map_err(|e| invalid(pattern, &e))?
                } else {
                    return Err(invalid(pattern, &err));
                }
            }
        };

        let mut cache = self.lock();
        if cache.len() >= self.capacity {
            cache.clear();
        }
        cache.insert(key, re.clone());
        Ok(re)
    }

    /// Number of cached compiled patterns.
    pub fn cached(&self) -> usize {
        self.lock().len()
    }

    /// Substitute up to `limit` matches (all when `None`).
    ///
    /// With `expand` the replacement may reference groups (`$1`, `${name}`);
    /// otherwise it is inserted verbatim.
    pub fn replace(
        &self,
        text: &str,
        pattern: &str,
        replacement: &str,
        opts: &MatchOptions,
        limit: Option<usize>,
        expand: bool,
    ) -> SurgeonResult<(String, usize)> {
        let matches = self.find_all(
            text,
            pattern,
            &MatchOptions {
                limit,
                ..opts.clone()
            },
        )?;
        if matches.is_empty() {
            return Ok((text.to_owned(), 0));
        }

        let re = self.compile(pattern, opts)?;
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in &matches {
            out.push_str(&text[last..m.start]);
            if expand {
                if let Some(caps) = re.captures_at(text, m.start) {
                    caps.expand(replacement, &mut out);
                } else {
                    out.push_str(replacement);
                }
            } else {
                out.push_str(replacement);
            }
            last = m.end;
        }
        out.push_str(&text[last..]);
        Ok((out, matches.len()))
    }

    /// Run a named pattern from the common library.
    pub fn find_named(&self, text: &str, name: &str) -> SurgeonResult<Vec<Match>> {
        let pattern = common_pattern(name)
            .ok_or_else(|| SurgeonError::InvalidRequest(format!("unknown library pattern: {name}")))?;
        self.find_all(
            text,
            pattern,
            &MatchOptions {
                auto_escape: false,
                ..MatchOptions::default()
            },
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, RegexFlags), Regex>> {
        // A poisoned cache only ever holds fully built regexes.
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for RegexMatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for RegexMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegexMatcher")
            .field("capacity", &self.capacity)
            .field("cached", &self.cached())
            .finish()
    }
}

impl Matcher for RegexMatcher {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn find(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Option<Match>> {
        let opts = MatchOptions {
            limit: Some(1),
            ..opts.clone()
        };
        Ok(self.find_all(text, pattern, &opts)?.into_iter().next())
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> SurgeonResult<Vec<Match>> {
        // An empty pattern would match between every pair of characters.
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let re = self.compile(pattern, opts)?;
        let limit = opts.limit.unwrap_or(usize::MAX);
        let names: Vec<Option<&str>> = re.capture_names().collect();

        let mut out = Vec::new();
        for caps in re.captures_iter(text) {
            if out.len() >= limit {
                break;
            }
            let Some(whole) = caps.get(0) else { continue };
            let (start, end) = (whole.start(), whole.end());
            if opts.whole_word && !on_word_boundary(text, start, end) {
                continue;
            }
            if !satisfies_anchor(text, start, end, opts.anchor) {
                continue;
            }

            let mut m = Match::at(text, start, end);
            for (idx, name) in names.iter().enumerate().skip(1) {
                let value = caps.get(idx).map(|g| g.as_str().to_owned());
                if let (Some(name), Some(v)) = (name, &value) {
                    m.named_groups.insert((*name).to_owned(), v.clone());
                }
                m.groups.push(value);
            }
            out.push(m);
        }
        Ok(out)
    }

    fn rewrite_for(&self, pattern: &str, flavor: PatternFlavor) -> String {
        match flavor {
            PatternFlavor::Regex => pattern.to_owned(),
            PatternFlavor::AstGrep => regex_to_ast_grep(pattern),
            PatternFlavor::Literal => unescape(pattern),
        }
    }
}

fn build(source: &str, flags: RegexFlags) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .build()
}

fn invalid(pattern: &str, err: &regex::Error) -> SurgeonError {
    SurgeonError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: err.to_string(),
    }
}

/// Drop backslashes that only escape punctuation.
fn unescape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if !next.is_alphanumeric() {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
