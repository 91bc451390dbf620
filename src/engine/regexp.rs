//! Regex engine backed by the caching [`RegexMatcher`].

use crate::capability::{Capability, CapabilitySet};
use crate::error::SurgeonResult;
use crate::matcher::{Match, MatchOptions, Matcher, RegexMatcher};

use super::{EditOutcome, Engine, EngineOptions};

#[derive(Debug, Default)]
pub struct RegexEngine {
    matcher: RegexMatcher,
}

impl RegexEngine {
    pub fn new(cache_size: usize) -> Self {
        Self {
            matcher: RegexMatcher::new(cache_size),
        }
    }

    pub const fn matcher(&self) -> &RegexMatcher {
        &self.matcher
    }

    /// Non-regex requests are escaped so they match exactly.
    fn prepare(pattern: &str, opts: &EngineOptions) -> (String, MatchOptions) {
        if opts.regex {
            (pattern.to_owned(), opts.matching.clone())
        } else {
            let matching = MatchOptions {
                auto_escape: false,
                ..opts.matching.clone()
            };
            (regex::escape(pattern), matching)
        }
    }
}

impl Engine for RegexEngine {
    fn name(&self) -> &str {
        "regex"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([
            Capability::RegexSearch,
            Capability::LiteralSearch,
            Capability::Multiline,
            Capability::Batch,
        ])
    }

    fn search(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<Vec<Match>> {
        let (pattern, matching) = Self::prepare(pattern, opts);
        self.matcher.find_all(content, &pattern, &matching)
    }

    fn replace(
        &self,
        content: &str,
        pattern: &str,
        replacement: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        let (prepared, matching) = Self::prepare(pattern, opts);
        let matches = self.matcher.find_all(content, &prepared, &matching)?;
        let (content, count) = self.matcher.replace(
            content,
            &prepared,
            replacement,
            &matching,
            matching.limit,
            opts.regex,
        )?;
        Ok(EditOutcome {
            content,
            matches,
            count,
        })
    }
}
