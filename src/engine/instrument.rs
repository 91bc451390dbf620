//! Per-call timing and success accounting around any engine.
//!
//! [`InstrumentedEngine`] is the only way the registry hands engines out, so
//! every primitive call is counted. Metrics sit behind a `Mutex`; the lock is
//! held only to record, never across the wrapped call.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::capability::{CapabilitySet, OperationKind};
use crate::error::SurgeonResult;
use crate::matcher::Match;

use super::{EditOutcome, Engine, EngineOptions};

/// Calls remembered per operation.
pub const HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub at: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationMetrics {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub last_ms: f64,
    #[serde(skip)]
    total_ms: f64,
    #[serde(skip)]
    history: VecDeque<CallRecord>,
}

impl OperationMetrics {
    fn record(&mut self, duration_ms: f64, success: bool) {
        if self.calls == 0 || duration_ms < self.min_ms {
            self.min_ms = duration_ms;
        }
        self.max_ms = self.max_ms.max(duration_ms);
        self.calls += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_ms += duration_ms;
        self.avg_ms = self.total_ms / self.calls as f64;
        self.last_ms = duration_ms;

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(CallRecord {
            at: Utc::now(),
            duration_ms,
            success,
        });
    }

    /// Most recent calls, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &CallRecord> {
        self.history.iter()
    }

    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.successes as f64 / self.calls as f64
        }
    }
}

/// Snapshot of one engine's metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub engine: String,
    pub total_calls: u64,
    pub operations: BTreeMap<String, OperationMetrics>,
}

pub struct InstrumentedEngine {
    label: String,
    inner: Box<dyn Engine>,
    metrics: Mutex<BTreeMap<&'static str, OperationMetrics>>,
}

impl InstrumentedEngine {
    pub fn new(label: impl Into<String>, inner: Box<dyn Engine>) -> Self {
        Self {
            label: label.into(),
            inner,
            metrics: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn inner(&self) -> &dyn Engine {
        self.inner.as_ref()
    }

    /// Metrics for one operation, if it has been called.
    pub fn metrics(&self, operation: &str) -> Option<OperationMetrics> {
        self.lock().get(operation).cloned()
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        let metrics = self.lock();
        PerformanceSummary {
            engine: self.label.clone(),
            total_calls: metrics.values().map(|m| m.calls).sum(),
            operations: metrics
                .iter()
                .map(|(op, m)| ((*op).to_owned(), m.clone()))
                .collect(),
        }
    }

    fn timed<T>(&self, operation: &'static str, call: impl FnOnce() -> SurgeonResult<T>) -> SurgeonResult<T> {
        let started = Instant::now();
        let result = call();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(engine = %self.label, op = operation, duration_ms, ok = result.is_ok(), "engine call");
        self.lock()
            .entry(operation)
            .or_default()
            .record(duration_ms, result.is_ok());
        result
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<&'static str, OperationMetrics>> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InstrumentedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedEngine")
            .field("label", &self.label)
            .field("capabilities", &self.inner.capabilities())
            .finish_non_exhaustive()
    }
}

impl Engine for InstrumentedEngine {
    fn name(&self) -> &str {
        &self.label
    }

    fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities()
    }

    fn supported_languages(&self) -> &'static [&'static str] {
        self.inner.supported_languages()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn supports_operation(&self, kind: OperationKind) -> bool {
        self.inner.supports_operation(kind)
    }

    fn search(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<Vec<Match>> {
        self.timed("search", || self.inner.search(content, pattern, opts))
    }

    fn replace(
        &self,
        content: &str,
        pattern: &str,
        replacement: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        self.timed("replace", || self.inner.replace(content, pattern, replacement, opts))
    }

    fn insert_before(
        &self,
        content: &str,
        pattern: &str,
        text: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        self.timed("insert_before", || self.inner.insert_before(content, pattern, text, opts))
    }

    fn insert_after(
        &self,
        content: &str,
        pattern: &str,
        text: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        self.timed("insert_after", || self.inner.insert_after(content, pattern, text, opts))
    }

    fn delete(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<EditOutcome> {
        self.timed("delete", || self.inner.delete(content, pattern, opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::literal::LiteralEngine;

    fn engine() -> InstrumentedEngine {
        InstrumentedEngine::new("literal", Box::new(LiteralEngine::new()))
    }

    #[test]
    fn test_counts_calls_and_successes() {
        let e = engine();
        let opts = EngineOptions::default();
        e.search("a b a", "a", &opts).expect("ok");
        e.search("a b a", "z", &opts).expect("ok");
        e.replace("a", "a", "b", &opts).expect("ok");

        let search = e.metrics("search").expect("recorded");
        assert_eq!(search.calls, 2);
        assert_eq!(search.successes, 2);
        assert_eq!(search.history().count(), 2);
        assert!(search.min_ms <= search.max_ms);

        let summary = e.performance_summary();
        assert_eq!(summary.engine, "literal");
        assert_eq!(summary.total_calls, 3);
        assert!(summary.operations.contains_key("replace"));
        assert!(e.metrics("delete").is_none());
    }

    #[test]
    fn test_failures_recorded() {
        let e = InstrumentedEngine::new("regex", Box::new(crate::engine::regexp::RegexEngine::default()));
        let opts = EngineOptions {
            regex: true,
            ..EngineOptions::default()
        };
        assert!(e.search("abc", r"(\w+[a-z{2,", &opts).is_err());
        let m = e.metrics("search").expect("recorded");
        assert_eq!(m.failures, 1);
        assert!((m.success_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut m = OperationMetrics::default();
        for _ in 0..HISTORY_LIMIT + 5 {
            m.record(1.0, true);
        }
        assert_eq!(m.history().count(), HISTORY_LIMIT);
        assert_eq!(m.calls, (HISTORY_LIMIT + 5) as u64);
        assert!((m.avg_ms - 1.0).abs() < 1e-9);
    }
}
