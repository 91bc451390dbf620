//! Heuristic complexity scoring for content and operation requests.
//!
//! The score is a weighted sum of structural signals. It never fails: empty
//! input scores zero, unrecognised syntax simply contributes nothing.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::capability::OperationKind;

static COMPLEX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // lambdas and arrow functions
        r"\blambda\b|=>",
        // comprehensions
        r"[\[{(][^\]})\n]*\bfor\b[^\]})\n]*\bin\b",
        // async / generators
        r"\basync\b|\bawait\b|\byield\b",
        // decorators and attributes
        r"(?m)^\s*(@\w|#\[)",
        // try / except / catch
        r"\btry\b|\bexcept\b|\bcatch\b",
        // context managers
        r"(?m)^\s*(async\s+)?with\s+.+:\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("BUG: complexity marker pattern is invalid"))
    .collect()
});

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:def|fn|function|func)\s+\w+")
        .expect("BUG: function marker pattern is invalid")
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:class|struct|trait|interface|enum)\s+\w+")
        .expect("BUG: class marker pattern is invalid")
});

static LAMBDA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blambda\b|=>").expect("BUG: lambda marker pattern is invalid"));

/// Width assumed for a tab when measuring indentation.
const TAB_WIDTH: usize = 4;

/// Coarse classification of a complexity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ComplexityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Critical
        } else if score >= 60.0 {
            Self::High
        } else if score >= 30.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Multiplier applied to an operation's base score.
    pub const fn factor(self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 1.3,
            Self::High => 1.6,
            Self::Critical => 2.0,
        }
    }

    pub const fn is_high(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Structural signals extracted from a piece of content.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplexityMetrics {
    pub line_count: usize,
    pub max_nesting_depth: usize,
    pub complex_patterns: usize,
    pub function_count: usize,
    pub class_count: usize,
    pub lambda_count: usize,
    pub score: f64,
}

impl ComplexityMetrics {
    pub fn level(&self) -> ComplexityLevel {
        ComplexityLevel::from_score(self.score)
    }
}

/// Stateless analyzer; cheap to copy around.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub const fn new() -> Self {
        Self
    }

    /// Compute the full metric breakdown for `content`.
    pub fn analyze(&self, content: &str) -> ComplexityMetrics {
        if content.trim().is_empty() {
            return ComplexityMetrics::default();
        }

        let line_count = content.lines().count();
        let max_nesting_depth = nesting_depth(content);
        let complex_patterns = COMPLEX_PATTERNS
            .iter()
            .map(|re| re.find_iter(content).count())
            .sum();
        let function_count = FUNCTION_RE.find_iter(content).count();
        let class_count = CLASS_RE.find_iter(content).count();
        let lambda_count = LAMBDA_RE.find_iter(content).count();

        let lines_score = ((line_count as f64 + 1.0).ln() * 4.0).min(20.0);
        let depth_score = (max_nesting_depth as f64).powf(1.5) * 8.0;
        let score = lines_score
            + depth_score
            + complex_patterns as f64 * 5.0
            + function_count as f64 * 3.0
            + class_count as f64 * 8.0
            + lambda_count as f64 * 4.0;

        ComplexityMetrics {
            line_count,
            max_nesting_depth,
            complex_patterns,
            function_count,
            class_count,
            lambda_count,
            score,
        }
    }

    pub fn score(&self, content: &str) -> ComplexityLevel {
        self.analyze(content).level()
    }

    /// Base score of an operation kind, scaled by the content's level when given.
    pub fn operation_score(&self, kind: OperationKind, content: Option<&str>) -> f64 {
        let base = match kind {
            OperationKind::Search => 10.0,
            OperationKind::Extract => 20.0,
            OperationKind::InsertBefore | OperationKind::InsertAfter => 25.0,
            OperationKind::Replace => 35.0,
            OperationKind::Delete => 45.0,
            OperationKind::Transform => 60.0,
        };
        content.map_or(base, |c| base * self.score(c).factor())
    }

    pub fn score_operation(&self, kind: OperationKind, content: Option<&str>) -> ComplexityLevel {
        ComplexityLevel::from_score(self.operation_score(kind, content))
    }
}

/// Width of a line's leading whitespace, with tabs expanded.
pub fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

/// Deepest nesting seen either through indentation or open brackets.
fn nesting_depth(content: &str) -> usize {
    let widths: Vec<usize> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(indent_width)
        .collect();
    let unit = widths.iter().copied().filter(|w| *w > 0).min().unwrap_or(0);
    let indent_depth = if unit == 0 {
        0
    } else {
        widths.iter().map(|w| w / unit).max().unwrap_or(0)
    };

    let mut depth = 0usize;
    let mut bracket_depth = 0usize;
    for ch in content.chars() {
        match ch {
            '{' | '[' | '(' => {
                depth += 1;
                bracket_depth = bracket_depth.max(depth);
            }
            '}' | ']' | ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    indent_depth.max(bracket_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_low() {
        let analyzer = ComplexityAnalyzer::new();
        assert_eq!(analyzer.score(""), ComplexityLevel::Low);
        assert_eq!(analyzer.score("   \n\t\n"), ComplexityLevel::Low);
        assert!(analyzer.analyze("  ").score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_level_bands() {
        assert_eq!(ComplexityLevel::from_score(29.9), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_score(30.0), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(59.9), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(60.0), ComplexityLevel::High);
        assert_eq!(ComplexityLevel::from_score(80.0), ComplexityLevel::Critical);
    }

    #[test]
    fn test_counts_markers() {
        let src = "@cached\nasync def load(x):\n    try:\n        return [y for y in x]\n    except KeyError:\n        pass\n\nclass Repo:\n    pass\n";
        let m = ComplexityAnalyzer::new().analyze(src);
        assert_eq!(m.function_count, 1);
        assert_eq!(m.class_count, 1);
        assert_eq!(m.max_nesting_depth, 2);
        // decorator, async, comprehension, try, except
        assert!(m.complex_patterns >= 5, "got {}", m.complex_patterns);
    }

    #[test]
    fn test_deeper_nesting_never_scores_lower() {
        let analyzer = ComplexityAnalyzer::new();
        let mut previous = -1.0;
        for depth in 1..=6 {
            let mut src = String::new();
            for level in 0..depth {
                src.push_str(&"    ".repeat(level));
                src.push_str("if ready:\n");
            }
            for level in depth..6 {
                src.push_str(&"    ".repeat(depth));
                src.push_str(&format!("value_{level} = 1\n"));
            }
            let score = analyzer.analyze(&src).score;
            assert!(score >= previous, "depth {depth}: {score} < {previous}");
            previous = score;
        }
    }

    #[test]
    fn test_operation_scores() {
        let analyzer = ComplexityAnalyzer::new();
        assert_eq!(
            analyzer.score_operation(OperationKind::Search, None),
            ComplexityLevel::Low
        );
        assert!(
            analyzer.operation_score(OperationKind::Delete, None)
                > analyzer.operation_score(OperationKind::Search, None)
        );
        let nested = "def a():\n    if x:\n        for y in z:\n            while w:\n                try:\n                    pass\n                except E:\n                    pass\n";
        let scaled = analyzer.operation_score(OperationKind::Replace, Some(nested));
        assert!(scaled > 35.0);
    }

    #[test]
    fn test_transform_scores_highest() {
        let analyzer = ComplexityAnalyzer::new();
        let transform = analyzer.operation_score(OperationKind::Transform, None);
        for kind in [
            OperationKind::Search,
            OperationKind::Extract,
            OperationKind::InsertBefore,
            OperationKind::InsertAfter,
            OperationKind::Replace,
            OperationKind::Delete,
        ] {
            assert!(transform > analyzer.operation_score(kind, None), "{kind}");
        }
        assert_eq!(
            analyzer.score_operation(OperationKind::Transform, None),
            ComplexityLevel::High
        );
    }

    #[test]
    fn test_tab_indent_width() {
        assert_eq!(indent_width("\tx"), 4);
        assert_eq!(indent_width("  \tx"), 6);
        assert_eq!(indent_width("x"), 0);
    }
}
