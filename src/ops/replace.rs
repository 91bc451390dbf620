//! Pattern replacement.

use std::collections::BTreeSet;

use tracing::debug;

use crate::engine::{EditOutcome, Engine, EngineOptions};
use crate::error::SurgeonResult;
use crate::matcher::Match;

/// Replace matches of `pattern` through `engine`, honouring the match limit in `opts`.
pub fn replace(
    engine: &dyn Engine,
    content: &str,
    pattern: &str,
    replacement: &str,
    opts: &EngineOptions,
) -> SurgeonResult<EditOutcome> {
    let outcome = engine.replace(content, pattern, replacement, opts)?;
    if outcome.count > 1 && opts.matching.limit.is_none() {
        debug!(
            engine = engine.name(),
            count = outcome.count,
            "pattern matched more than once, replacing every occurrence"
        );
    }
    Ok(outcome)
}

/// 1-based lines where matches start, without repeats.
pub fn touched_lines(matches: &[Match]) -> Vec<usize> {
    matches
        .iter()
        .filter_map(|m| m.line)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Whether a plain-text replacement reintroduces its own pattern, so running
/// the same edit again would match again.
pub fn reintroduces_pattern(pattern: &str, replacement: &str, case_sensitive: bool) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if case_sensitive {
        replacement.contains(pattern)
    } else {
        replacement.to_lowercase().contains(&pattern.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::literal::LiteralEngine;

    #[test]
    fn test_replace_twice_is_stable() {
        let e = LiteralEngine::new();
        let opts = EngineOptions::default();
        let once = replace(&e, "old(); old();\nold();", "old", "new", &opts).expect("ok");
        assert_eq!(once.count, 3);
        assert_eq!(touched_lines(&once.matches), vec![1, 2]);
        let twice = replace(&e, &once.content, "old", "new", &opts).expect("ok");
        assert_eq!(twice.count, 0);
        assert_eq!(twice.content, once.content);
    }

    #[test]
    fn test_reintroduces_pattern() {
        assert!(reintroduces_pattern("log", "log_debug", true));
        assert!(!reintroduces_pattern("Log", "log_debug", true));
        assert!(reintroduces_pattern("Log", "log_debug", false));
        assert!(!reintroduces_pattern("", "x", true));
    }
}
