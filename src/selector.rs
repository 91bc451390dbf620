//! Engine selection: filter the registry by capability, score, rank, pick one.
//!
//! Selection never fails. When no registered engine covers the required
//! capabilities the literal fallback is returned and a warning is logged.
//! All weights live in [`ScoringPolicy`] so they can be tuned from config
//! without touching the algorithm.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::{Capability, CapabilitySet};
use crate::complexity::{ComplexityAnalyzer, ComplexityLevel};
use crate::engine::{Engine, InstrumentedEngine, Registry};
use crate::matcher::RegexMatcher;

static STRUCTURAL_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:if|elif|else|for|while|match|switch|try|except|catch|finally|with|def|class|fn|function|import|from|use|require|return)\b",
    )
    .expect("BUG: structural hint pattern is invalid")
});

/// How heavy an engine is, judged from its capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnginePower {
    Literal = 1,
    Regex = 2,
    TreeAware = 3,
}

impl EnginePower {
    pub fn of(caps: &CapabilitySet) -> Self {
        if caps.contains(Capability::TreeAware) {
            Self::TreeAware
        } else if caps.contains(Capability::RegexSearch) {
            Self::Regex
        } else {
            Self::Literal
        }
    }
}

/// Score adjustment per engine power for one complexity band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerAdjustment {
    pub tree_aware: f64,
    pub regex: f64,
    pub literal: f64,
}

impl PowerAdjustment {
    pub const fn for_power(&self, power: EnginePower) -> f64 {
        match power {
            EnginePower::TreeAware => self.tree_aware,
            EnginePower::Regex => self.regex,
            EnginePower::Literal => self.literal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityAdjustments {
    pub low: PowerAdjustment,
    pub medium: PowerAdjustment,
    /// Applied to both high and critical.
    pub high: PowerAdjustment,
}

impl Default for ComplexityAdjustments {
    fn default() -> Self {
        Self {
            low: PowerAdjustment {
                tree_aware: -5.0,
                regex: 5.0,
                literal: 15.0,
            },
            medium: PowerAdjustment {
                tree_aware: -5.0,
                regex: 15.0,
                literal: 5.0,
            },
            high: PowerAdjustment {
                tree_aware: 25.0,
                regex: 10.0,
                literal: -25.0,
            },
        }
    }
}

impl ComplexityAdjustments {
    pub fn for_level(&self, level: ComplexityLevel) -> &PowerAdjustment {
        match level {
            ComplexityLevel::Low => &self.low,
            ComplexityLevel::Medium => &self.medium,
            ComplexityLevel::High | ComplexityLevel::Critical => &self.high,
        }
    }
}

/// Every tunable weight the selector uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub available_bonus: f64,
    pub unavailable_bonus: f64,
    /// Primary capability (kebab-case name) → engine name → bonus.
    pub priorities: BTreeMap<String, BTreeMap<String, f64>>,
    pub complexity: ComplexityAdjustments,
    /// Language → engine name → multiplier (1.0 is neutral).
    pub language_affinity: BTreeMap<String, BTreeMap<String, f64>>,
    /// Turns an affinity multiplier into points: `(m - 1.0) * scale`.
    pub affinity_scale: f64,
    pub language_specific_bonus: f64,
    /// Subtracted when a language was requested that the engine does not list.
    pub language_mismatch_penalty: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        let table = |rows: &[(&str, f64)]| -> BTreeMap<String, f64> {
            rows.iter().map(|(n, w)| ((*n).to_owned(), *w)).collect()
        };

        let priorities = BTreeMap::from([
            (
                "literal-search".to_owned(),
                table(&[("literal", 30.0), ("regex", 15.0), ("fuzzy", 5.0)]),
            ),
            (
                "regex-search".to_owned(),
                table(&[("regex", 30.0), ("ast-grep", 10.0), ("block", 5.0)]),
            ),
            (
                "structural-search".to_owned(),
                table(&[("ast-grep", 30.0), ("block", 25.0), ("regex", 5.0)]),
            ),
            ("tree-aware".to_owned(), table(&[("block", 30.0), ("ast-grep", 25.0)])),
            (
                "context-aware".to_owned(),
                table(&[("fuzzy", 20.0), ("block", 15.0), ("ast-grep", 15.0)]),
            ),
            (
                "multiline".to_owned(),
                table(&[("regex", 20.0), ("literal", 15.0), ("block", 10.0)]),
            ),
            (
                "language-specific".to_owned(),
                table(&[("ast-grep", 25.0), ("block", 20.0)]),
            ),
            ("batch".to_owned(), table(&[("literal", 25.0), ("regex", 20.0)])),
        ]);

        let structural = table(&[("ast-grep", 1.3)]);
        let language_affinity = BTreeMap::from([
            ("python".to_owned(), table(&[("block", 1.3), ("ast-grep", 1.1)])),
            ("yaml".to_owned(), table(&[("block", 1.2)])),
            ("javascript".to_owned(), structural.clone()),
            ("typescript".to_owned(), structural.clone()),
            ("rust".to_owned(), structural.clone()),
            ("go".to_owned(), structural.clone()),
            ("java".to_owned(), structural),
        ]);

        Self {
            available_bonus: 100.0,
            unavailable_bonus: 10.0,
            priorities,
            complexity: ComplexityAdjustments::default(),
            language_affinity,
            affinity_scale: 50.0,
            language_specific_bonus: 5.0,
            language_mismatch_penalty: 50.0,
        }
    }
}

impl ScoringPolicy {
    fn priority(&self, primary: Capability, engine: &str) -> f64 {
        self.priorities
            .get(primary.as_str())
            .and_then(|row| row.get(engine))
            .copied()
            .unwrap_or(0.0)
    }

    fn affinity(&self, language: &str, engine: &str) -> f64 {
        self.language_affinity
            .get(&language.to_ascii_lowercase())
            .and_then(|row| row.get(engine))
            .map_or(0.0, |m| (m - 1.0) * self.affinity_scale)
    }
}

/// What the caller wants an engine for.
#[derive(Debug, Clone, Default)]
pub struct SelectionRequest<'a> {
    /// Primary search kind. `None` means infer it from the pattern or content.
    pub operation: Option<Capability>,
    pub capabilities: CapabilitySet,
    pub language: Option<&'a str>,
    /// The pattern to be searched for; preferred over `content` for inference.
    pub pattern: Option<&'a str>,
    pub content: Option<&'a str>,
    pub complexity: Option<ComplexityLevel>,
}

impl<'a> SelectionRequest<'a> {
    /// Required capabilities given by name; unknown names are dropped with a warning.
    pub fn with_capability_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.capabilities = CapabilitySet::from_names(names);
        self
    }

    #[must_use]
    pub const fn with_language(mut self, language: Option<&'a str>) -> Self {
        self.language = language;
        self
    }

    #[must_use]
    pub const fn with_content(mut self, content: &'a str) -> Self {
        self.content = Some(content);
        self
    }

    #[must_use]
    pub const fn with_pattern(mut self, pattern: &'a str) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEngine {
    pub name: String,
    pub score: f64,
    pub available: bool,
}

/// The chosen engine and how it was chosen.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    #[serde(skip)]
    pub engine: Arc<InstrumentedEngine>,
    #[serde(rename = "engine")]
    pub engine_name: String,
    pub score: f64,
    /// Every candidate, best first.
    pub ranking: Vec<RankedEngine>,
    pub primary: Capability,
    /// Set when the primary kind was inferred rather than given.
    pub inferred: Option<Capability>,
    pub complexity: Option<ComplexityLevel>,
    pub used_fallback: bool,
}

#[derive(Debug)]
pub struct EngineSelector {
    registry: Arc<Registry>,
    policy: ScoringPolicy,
    analyzer: ComplexityAnalyzer,
}

impl EngineSelector {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_policy(registry, ScoringPolicy::default())
    }

    pub const fn with_policy(registry: Arc<Registry>, policy: ScoringPolicy) -> Self {
        Self {
            registry,
            policy,
            analyzer: ComplexityAnalyzer::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub const fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Guess the primary search kind from a pattern or content sample.
    pub fn infer_kind(sample: &str) -> Capability {
        if STRUCTURAL_HINT_RE.is_match(sample) {
            Capability::StructuralSearch
        } else if !RegexMatcher::looks_literal(sample) {
            Capability::RegexSearch
        } else {
            Capability::LiteralSearch
        }
    }

    pub fn select(&self, request: &SelectionRequest<'_>) -> Selection {
        let complexity = request
            .complexity
            .or_else(|| request.content.map(|c| self.analyzer.score(c)));

        let inferred = match (request.operation, request.pattern.or(request.content)) {
            (None, Some(sample)) => Some(Self::infer_kind(sample)),
            _ => None,
        };
        let primary = request
            .operation
            .or(inferred)
            .or_else(|| request.capabilities.iter().next())
            .unwrap_or(Capability::LiteralSearch);

        let candidates: Vec<Arc<InstrumentedEngine>> = self
            .registry
            .engines()
            .into_iter()
            .filter(|e| e.capabilities().is_superset(&request.capabilities))
            .collect();

        if candidates.is_empty() {
            warn!(
                required = %request.capabilities,
                "no engine satisfies the required capabilities, using literal fallback"
            );
            let engine = self.registry.fallback();
            let score = self.score(engine.as_ref(), primary, complexity, request.language);
            return Selection {
                engine_name: engine.name().to_owned(),
                ranking: vec![RankedEngine {
                    name: engine.name().to_owned(),
                    score,
                    available: engine.is_available(),
                }],
                engine,
                score,
                primary,
                inferred,
                complexity,
                used_fallback: true,
            };
        }

        let mut scored: Vec<(f64, Arc<InstrumentedEngine>)> = candidates
            .into_iter()
            .map(|e| (self.score(e.as_ref(), primary, complexity, request.language), e))
            .collect();
        // Stable: equal scores keep registration order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let ranking: Vec<RankedEngine> = scored
            .iter()
            .map(|(score, e)| RankedEngine {
                name: e.name().to_owned(),
                score: *score,
                available: e.is_available(),
            })
            .collect();
        debug!(primary = %primary, ranking = ?ranking, "engine ranking");

        let (score, engine) = scored.swap_remove(0);
        Selection {
            engine_name: engine.name().to_owned(),
            engine,
            score,
            ranking,
            primary,
            inferred,
            complexity,
            used_fallback: false,
        }
    }

    fn score(
        &self,
        engine: &dyn Engine,
        primary: Capability,
        complexity: Option<ComplexityLevel>,
        language: Option<&str>,
    ) -> f64 {
        let p = &self.policy;
        let name = engine.name();
        let caps = engine.capabilities();

        let mut score = if engine.is_available() {
            p.available_bonus
        } else {
            p.unavailable_bonus
        };
        score += p.priority(primary, name);
        if let Some(level) = complexity {
            score += p.complexity.for_level(level).for_power(EnginePower::of(&caps));
        }
        if let Some(lang) = language {
            score += p.affinity(lang, name);
            if caps.contains(Capability::LanguageSpecific) {
                score += p.language_specific_bonus;
            }
            if !engine.supports_language(lang) {
                score -= p.language_mismatch_penalty;
            }
        }
        score
    }
}
