//! Capability tags and operation kinds.
//!
//! Capabilities form a closed set. Strings arriving from callers (config,
//! MCP arguments) are normalised at the boundary; anything outside the set is
//! dropped with a warning instead of silently matching nothing.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What a backend engine can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    LiteralSearch,
    RegexSearch,
    StructuralSearch,
    TreeAware,
    Multiline,
    ContextAware,
    LanguageSpecific,
    Batch,
}

impl Capability {
    pub const ALL: [Self; 8] = [
        Self::LiteralSearch,
        Self::RegexSearch,
        Self::StructuralSearch,
        Self::TreeAware,
        Self::Multiline,
        Self::ContextAware,
        Self::LanguageSpecific,
        Self::Batch,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LiteralSearch => "literal-search",
            Self::RegexSearch => "regex-search",
            Self::StructuralSearch => "structural-search",
            Self::TreeAware => "tree-aware",
            Self::Multiline => "multiline",
            Self::ContextAware => "context-aware",
            Self::LanguageSpecific => "language-specific",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    /// Accepts kebab, snake and bare forms: `regex-search`, `regex_search`, `regex`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('_', "-");
        let cap = match key.as_str() {
            "literal-search" | "literal" => Self::LiteralSearch,
            "regex-search" | "regex" => Self::RegexSearch,
            "structural-search" | "structural" => Self::StructuralSearch,
            "tree-aware" | "tree" | "ast" => Self::TreeAware,
            "multiline" | "multi-line" => Self::Multiline,
            "context-aware" | "context" => Self::ContextAware,
            "language-specific" => Self::LanguageSpecific,
            "batch" => Self::Batch,
            _ => return Err(format!("unknown capability: {s}")),
        };
        Ok(cap)
    }
}

/// An ordered set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cap: Capability) -> bool {
        self.0.insert(cap)
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    pub fn is_superset(&self, other: &Self) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Normalise caller-supplied strings, warning on and dropping unknown tags.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in names {
            match name.as_ref().parse::<Capability>() {
                Ok(cap) => {
                    set.insert(cap);
                }
                Err(reason) => warn!(capability = name.as_ref(), "{reason}, ignoring"),
            }
        }
        set
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Capability; N]> for CapabilitySet {
    fn from(caps: [Capability; N]) -> Self {
        caps.into_iter().collect()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Primitive operation kinds an engine may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Search,
    Replace,
    InsertBefore,
    InsertAfter,
    Delete,
    Extract,
    /// Several edits applied as one batch.
    Transform,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Replace => "replace",
            Self::InsertBefore => "insert_before",
            Self::InsertAfter => "insert_after",
            Self::Delete => "delete",
            Self::Extract => "extract",
            Self::Transform => "transform",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "search" | "find" => Ok(Self::Search),
            "replace" => Ok(Self::Replace),
            "insert_before" => Ok(Self::InsertBefore),
            "insert_after" => Ok(Self::InsertAfter),
            "delete" => Ok(Self::Delete),
            "extract" => Ok(Self::Extract),
            "transform" | "batch" => Ok(Self::Transform),
            _ => Err(format!("unknown operation kind: {s}")),
        }
    }
}
