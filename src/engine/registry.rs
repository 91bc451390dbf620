//! Engine registry: name → constructor, with lazily built shared instances.
//!
//! Registration happens once at startup through `&mut self`; afterwards the
//! registry is shared read-only (typically behind an `Arc`) and only the
//! instance cache mutates.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, info};

use crate::config::SurgeonConfig;
use crate::error::{SurgeonError, SurgeonResult};
use crate::matcher::fuzzy::DEFAULT_THRESHOLD;

use super::ast_grep::AstGrepEngine;
use super::block::BlockEngine;
use super::fuzzy::FuzzyEngine;
use super::instrument::{InstrumentedEngine, PerformanceSummary};
use super::literal::LiteralEngine;
use super::regexp::RegexEngine;
use super::{Engine, EngineDescriptor};

/// Construction parameters shared by every engine constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineParams {
    pub fuzzy_threshold: f64,
    pub regex_cache_size: usize,
    pub ast_grep_binary: Option<PathBuf>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_THRESHOLD,
            regex_cache_size: 256,
            ast_grep_binary: None,
        }
    }
}

impl From<&SurgeonConfig> for EngineParams {
    fn from(config: &SurgeonConfig) -> Self {
        Self {
            fuzzy_threshold: config.matching.fuzzy_threshold,
            regex_cache_size: config.matching.regex_cache_size,
            ast_grep_binary: config.engines.ast_grep_binary.clone(),
        }
    }
}

pub type EngineConstructor = Box<dyn Fn(&EngineParams) -> Box<dyn Engine> + Send + Sync>;

pub const FALLBACK_ENGINE: &str = "literal";

pub struct Registry {
    params: EngineParams,
    constructors: Vec<(String, EngineConstructor)>,
    instances: Mutex<HashMap<String, Arc<InstrumentedEngine>>>,
    orphan_fallback: OnceLock<Arc<InstrumentedEngine>>,
}

impl Registry {
    /// An empty registry.
    pub fn new(params: EngineParams) -> Self {
        Self {
            params,
            constructors: Vec::new(),
            instances: Mutex::new(HashMap::new()),
            orphan_fallback: OnceLock::new(),
        }
    }

    /// The built-in engines: literal, regex, fuzzy, block, ast-grep.
    pub fn with_defaults(params: EngineParams) -> Self {
        Self::with_defaults_except(params, &[])
    }

    pub fn from_config(config: &SurgeonConfig) -> Self {
        Self::with_defaults_except(EngineParams::from(config), &config.engines.disabled)
    }

    fn with_defaults_except(params: EngineParams, disabled: &[String]) -> Self {
        let mut registry = Self::new(params);
        let builtins: [(&str, fn(&EngineParams) -> Box<dyn Engine>); 5] = [
            ("literal", literal),
            ("regex", regex),
            ("fuzzy", fuzzy),
            ("block", block),
            ("ast-grep", ast_grep),
        ];
        for (name, ctor) in builtins {
            if disabled.iter().any(|d| d == name) {
                info!(engine = name, "engine disabled by configuration");
                continue;
            }
            let ctor: EngineConstructor = Box::new(ctor);
            registry.constructors.push((name.to_owned(), ctor));
        }
        registry
    }

    /// Add an engine under `name`. Each name can be registered once.
    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F) -> SurgeonResult<()>
    where
        F: Fn(&EngineParams) -> Box<dyn Engine> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(SurgeonError::DuplicateEngine(name));
        }
        debug!(engine = %name, "engine registered");
        let ctor: EngineConstructor = Box::new(ctor);
        self.constructors.push((name, ctor));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.iter().any(|(n, _)| n == name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub const fn params(&self) -> &EngineParams {
        &self.params
    }

    /// The shared instance for `name`, built on first use.
    pub fn get(&self, name: &str) -> Option<Arc<InstrumentedEngine>> {
        let (_, ctor) = self.constructors.iter().find(|(n, _)| n == name)?;
        let mut instances = self.lock();
        let engine = instances
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(InstrumentedEngine::new(name, ctor(&self.params))));
        Some(Arc::clone(engine))
    }

    /// A fresh, uncached instance built with custom parameters.
    pub fn build(&self, name: &str, params: &EngineParams) -> Option<InstrumentedEngine> {
        let (_, ctor) = self.constructors.iter().find(|(n, _)| n == name)?;
        Some(InstrumentedEngine::new(name, ctor(params)))
    }

    /// Every registered engine's shared instance, in registration order.
    pub fn engines(&self) -> Vec<Arc<InstrumentedEngine>> {
        self.names().filter_map(|n| self.get(n)).collect()
    }

    /// The literal engine. Works even when `literal` was never registered.
    pub fn fallback(&self) -> Arc<InstrumentedEngine> {
        self.get(FALLBACK_ENGINE).unwrap_or_else(|| {
            Arc::clone(self.orphan_fallback.get_or_init(|| {
                Arc::new(InstrumentedEngine::new(FALLBACK_ENGINE, Box::new(LiteralEngine::new())))
            }))
        })
    }

    pub fn describe(&self) -> Vec<EngineDescriptor> {
        self.engines().iter().map(|e| e.descriptor()).collect()
    }

    /// Metrics of every engine built so far.
    pub fn performance_report(&self) -> Vec<PerformanceSummary> {
        let instances = self.lock();
        self.names()
            .filter_map(|n| instances.get(n))
            .map(|e| e.performance_summary())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<InstrumentedEngine>>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn literal(_: &EngineParams) -> Box<dyn Engine> {
    Box::new(LiteralEngine::new())
}

fn regex(params: &EngineParams) -> Box<dyn Engine> {
    Box::new(RegexEngine::new(params.regex_cache_size))
}

fn fuzzy(params: &EngineParams) -> Box<dyn Engine> {
    Box::new(FuzzyEngine::new(params.fuzzy_threshold))
}

fn block(params: &EngineParams) -> Box<dyn Engine> {
    Box::new(BlockEngine::new(params.regex_cache_size))
}

fn ast_grep(params: &EngineParams) -> Box<dyn Engine> {
    Box::new(AstGrepEngine::new(params.ast_grep_binary.as_deref()))
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults(EngineParams::default())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("engines", &self.names().collect::<Vec<_>>())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;

    #[test]
    fn test_default_order() {
        let r = Registry::default();
        assert_eq!(
            r.names().collect::<Vec<_>>(),
            vec!["literal", "regex", "fuzzy", "block", "ast-grep"]
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut r = Registry::default();
        let err = r
            .register("regex", |_| Box::new(RegexEngine::default()))
            .expect_err("write-once");
        assert!(matches!(err, SurgeonError::DuplicateEngine(ref n) if n == "regex"));
        r.register("regex2", |_| Box::new(RegexEngine::default()))
            .expect("new name");
        assert!(r.contains("regex2"));
    }

    #[test]
    fn test_get_is_cached_build_is_not() {
        let r = Registry::default();
        let a = r.get("fuzzy").expect("registered");
        let b = r.get("fuzzy").expect("registered");
        assert!(Arc::ptr_eq(&a, &b));

        let custom = r
            .build(
                "fuzzy",
                &EngineParams {
                    fuzzy_threshold: 0.99,
                    ..EngineParams::default()
                },
            )
            .expect("registered");
        let found = custom
            .search("we recieve", "receive", &EngineOptions::default())
            .expect("ok");
        assert!(found.is_empty());
        let found = a.search("we recieve", "receive", &EngineOptions::default()).expect("ok");
        assert_eq!(found.len(), 1);
        assert!(r.get("missing").is_none());
    }

    #[test]
    fn test_fallback_without_literal() {
        let mut r = Registry::new(EngineParams::default());
        r.register("regex", |p| Box::new(RegexEngine::new(p.regex_cache_size)))
            .expect("ok");
        let fb = r.fallback();
        assert_eq!(fb.name(), "literal");
        assert!(Arc::ptr_eq(&fb, &r.fallback()));
    }

    #[test]
    fn test_disabled_engines_skipped() {
        let mut config = SurgeonConfig::default();
        config.engines.disabled = vec!["ast-grep".to_owned(), "fuzzy".to_owned()];
        let r = Registry::from_config(&config);
        assert_eq!(r.names().collect::<Vec<_>>(), vec!["literal", "regex", "block"]);
    }

    #[test]
    fn test_performance_report_covers_built_engines() {
        let r = Registry::default();
        r.get("literal")
            .expect("registered")
            .search("abc", "b", &EngineOptions::default())
            .expect("ok");
        let report = r.performance_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].engine, "literal");
        assert_eq!(report[0].total_calls, 1);
    }
}
