//! Similarity-threshold engine for patterns that are close but not exact.

use crate::capability::{Capability, CapabilitySet};
use crate::error::SurgeonResult;
use crate::matcher::{FuzzyMatcher, Match, Matcher, PatternFlavor, RegexMatcher};

use super::{EditOutcome, Engine, EngineOptions, splice};

#[derive(Debug)]
pub struct FuzzyEngine {
    matcher: FuzzyMatcher,
    degrade: RegexMatcher,
}

impl FuzzyEngine {
    pub fn new(threshold: f64) -> Self {
        Self {
            matcher: FuzzyMatcher::new(threshold),
            degrade: RegexMatcher::new(1),
        }
    }
}

impl Default for FuzzyEngine {
    fn default() -> Self {
        Self::new(crate::matcher::fuzzy::DEFAULT_THRESHOLD)
    }
}

impl Engine for FuzzyEngine {
    fn name(&self) -> &str {
        "fuzzy"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([
            Capability::LiteralSearch,
            Capability::ContextAware,
            Capability::Multiline,
        ])
    }

    fn search(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<Vec<Match>> {
        let pattern = if opts.regex {
            self.degrade.rewrite_for(pattern, PatternFlavor::Literal)
        } else {
            pattern.to_owned()
        };
        self.matcher.find_all(content, &pattern, &opts.matching)
    }

    fn replace(
        &self,
        content: &str,
        pattern: &str,
        replacement: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        let matches = self.search(content, pattern, opts)?;
        Ok(EditOutcome {
            content: splice(content, &matches, replacement),
            count: matches.len(),
            matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_near_miss() {
        let e = FuzzyEngine::default();
        let out = e
            .replace("we recieve data", "receive", "accept", &EngineOptions::default())
            .expect("ok");
        assert_eq!(out.content, "we accept data");
        assert_eq!(out.count, 1);
        assert!(out.matches[0].similarity.is_some());
    }

    #[test]
    fn test_nothing_close_enough() {
        let e = FuzzyEngine::new(0.95);
        let found = e.search("alpha beta", "omega", &EngineOptions::default()).expect("ok");
        assert!(found.is_empty());
    }
}
