//! Plain-text engine. Always available; the selector's fallback.

use crate::capability::{Capability, CapabilitySet};
use crate::error::SurgeonResult;
use crate::matcher::{LiteralMatcher, Match, Matcher, PatternFlavor, RegexMatcher};

use super::{EditOutcome, Engine, EngineOptions, splice};

#[derive(Debug, Default)]
pub struct LiteralEngine {
    matcher: LiteralMatcher,
    degrade: RegexMatcher,
}

impl LiteralEngine {
    pub fn new() -> Self {
        Self {
            matcher: LiteralMatcher::new(),
            degrade: RegexMatcher::new(1),
        }
    }

    /// A regex request is searched for as the text it would match literally.
    fn pattern(&self, pattern: &str, opts: &EngineOptions) -> String {
        if opts.regex {
            self.degrade.rewrite_for(pattern, PatternFlavor::Literal)
        } else {
            pattern.to_owned()
        }
    }
}

impl Engine for LiteralEngine {
    fn name(&self) -> &str {
        "literal"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([Capability::LiteralSearch, Capability::Multiline, Capability::Batch])
    }

    fn search(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<Vec<Match>> {
        self.matcher
            .find_all(content, &self.pattern(pattern, opts), &opts.matching)
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
    use crate::matcher::MatchOptions;

    #[test]
    fn test_replace_all() {
        let e = LiteralEngine::new();
        let out = e
            .replace("foo(1); foo(2);", "foo", "bar", &EngineOptions::default())
            .expect("ok");
        assert_eq!(out.content, "bar(1); bar(2);");
        assert_eq!(out.count, 2);
    }

    #[test]
    fn test_replace_bounded() {
        let e = LiteralEngine::new();
        let opts = EngineOptions {
            matching: MatchOptions {
                limit: Some(1),
                ..MatchOptions::default()
            },
            ..EngineOptions::default()
        };
        let out = e.replace("x x x", "x", "y", &opts).expect("ok");
        assert_eq!(out.content, "y x x");
    }

    #[test]
    fn test_regex_request_degrades_to_text() {
        let e = LiteralEngine::new();
        let opts = EngineOptions {
            regex: true,
            ..EngineOptions::default()
        };
        let found = e.search("call a.b()", r"a\.b\(\)", &opts).expect("ok");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "a.b()");
    }

    #[test]
    fn test_delete_removes_matched_lines() {
        let e = LiteralEngine::new();
        let out = e
            .delete("keep\ndrop this\nkeep\n", "drop", &EngineOptions::default())
            .expect("ok");
        assert_eq!(out.content, "keep\nkeep\n");
        assert_eq!(out.count, 1);
        assert_eq!(out.matches[0].text, "drop");
    }
}
