//! End-to-end behaviour of the public API: selection, matching, and
//! reversible edits against real files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use surgical_modifier::capability::Capability;
use surgical_modifier::complexity::ComplexityAnalyzer;
use surgical_modifier::engine::EngineParams;
use surgical_modifier::engine::literal::LiteralEngine;
use surgical_modifier::engine::regexp::RegexEngine;
use surgical_modifier::matcher::literal::LiteralMatcher;
use surgical_modifier::matcher::regexp::RegexMatcher;
use surgical_modifier::matcher::{MatchOptions, Matcher};
use surgical_modifier::ops::backup::MemoryBackupStore;
use surgical_modifier::selector::SelectionRequest;
use surgical_modifier::{
    EngineSelector, ExecuteOptions, Operation, OperationStatus, Registry, Surgeon, SurgeonConfig,
};

fn config() -> SurgeonConfig {
    let mut config = SurgeonConfig::default();
    config.backup.in_memory = true;
    config.engines.disabled = vec!["ast-grep".to_owned()];
    config
}

fn seeded(name: &str, content: &str) -> (tempfile::TempDir, Surgeon, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("seed");
    let surgeon = Surgeon::with_config(dir.path(), config());
    (dir, surgeon, path)
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read")
}

#[test]
fn test_delete_function_removes_whole_block() {
    let (_dir, surgeon, path) = seeded("m.py", "def foo():\n    return 1\n\ndef bar():\n    return 2");
    let result = surgeon
        .execute(Operation::Delete, &path, "def foo():", None, &ExecuteOptions::default())
        .expect("valid request");

    assert_eq!(result.status, OperationStatus::Success, "{result:?}");
    assert_eq!(result.operation_count, 1);
    assert_eq!(read(&path), "\ndef bar():\n    return 2");
    assert!(result.metadata.contains_key("snapshot_id"));
}

#[test]
fn test_regex_insert_after_first_import() {
    let (_dir, surgeon, path) = seeded("imports.py", "import os\nimport sys");
    let options = ExecuteOptions {
        regex_mode: true,
        max_replacements: 1,
        ..ExecuteOptions::default()
    };
    let result = surgeon
        .execute(Operation::InsertAfter, &path, r"^import\s+\w+", Some("import json"), &options)
        .expect("valid request");

    assert!(result.success(), "{result:?}");
    assert_eq!(read(&path), "import os\nimport json\nimport sys");
    assert_eq!(result.metadata["engine_used"], json!("regex"));
}

#[test]
fn test_fuzzy_search_tolerates_misspelling() {
    let (_dir, surgeon, path) = seeded("net.py", "def receive(data):\n    return data\n");
    let options = ExecuteOptions {
        engine: Some("fuzzy".to_owned()),
        ..ExecuteOptions::default()
    };
    let result = surgeon
        .execute(Operation::Search, &path, "recieve", None, &options)
        .expect("valid request");

    assert!(result.success(), "{result:?}");
    let best = &result.matches[0];
    assert_eq!(best.text, "receive");
    assert_eq!(best.line, Some(1));
    assert!(best.similarity.expect("fuzzy similarity") >= 0.6);
    assert_eq!(read(&path), "def receive(data):\n    return data\n");
}

#[test]
fn test_structural_request_without_structural_engine_uses_literal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("calc.py");
    std::fs::write(&path, "def compute(x):\n    return x * 2\n").expect("seed");

    let mut registry = Registry::new(EngineParams::default());
    registry
        .register("literal", |_| Box::new(LiteralEngine::new()))
        .expect("register literal");
    registry
        .register("regex", |p| Box::new(RegexEngine::new(p.regex_cache_size)))
        .expect("register regex");
    let surgeon = Surgeon::with_parts(
        dir.path(),
        config(),
        Arc::new(registry),
        Box::new(MemoryBackupStore::new()),
    );

    let options = ExecuteOptions {
        required_capabilities: vec!["structural-search".to_owned()],
        ..ExecuteOptions::default()
    };
    let result = surgeon
        .execute(Operation::Search, &path, "def compute", None, &options)
        .expect("valid request");

    assert!(result.success(), "{result:?}");
    assert_eq!(result.metadata["engine_used"], json!("literal"));
    assert_eq!(result.metadata["selection"]["used_fallback"], json!(true));
    assert_eq!(result.matches[0].line, Some(1));
}

#[test]
fn test_selection_is_stable_across_calls() {
    let selector = EngineSelector::new(Arc::new(Registry::from_config(&config())));
    let content = "class Cache:\n    def get(self, key):\n        if key in self.items:\n            return self.items[key]\n";
    let request = SelectionRequest {
        language: Some("python"),
        ..SelectionRequest::default()
    }
    .with_content(content)
    .with_pattern("def get");

    let first = selector.select(&request);
    for _ in 0..10 {
        let again = selector.select(&request);
        assert_eq!(again.engine_name, first.engine_name);
        assert_eq!(again.ranking, first.ranking);
        assert_eq!(again.primary, first.primary);
    }
}

#[test]
fn test_every_capability_set_gets_an_engine() {
    let registries = [
        Registry::from_config(&config()),
        Registry::new(EngineParams::default()),
    ];
    let requests: [&[&str]; 5] = [
        &[],
        &["structural-search", "tree-aware"],
        &["batch", "language-specific"],
        &["regex", "multiline"],
        &["not-a-capability"],
    ];
    for registry in registries {
        let selector = EngineSelector::new(Arc::new(registry));
        for names in requests {
            let selection = selector.select(&SelectionRequest::default().with_capability_names(names));
            assert!(!selection.engine_name.is_empty(), "{names:?}");
        }
    }
}

#[test]
fn test_rollback_restores_exact_bytes() {
    let original = "a = 1\r\nb = 2\r\n\r\n";
    let (_dir, surgeon, path) = seeded("crlf.py", original);
    let options = ExecuteOptions::default();

    surgeon
        .execute(Operation::Replace, &path, "a = 1", Some("a = 100"), &options)
        .expect("replace");
    surgeon
        .execute(Operation::Append, &path, "", Some("c = 3"), &options)
        .expect("append");
    assert_ne!(read(&path), original);

    assert!(surgeon.rollback(&path).expect("rollback"));
    assert_eq!(std::fs::read(&path).expect("bytes"), original.as_bytes());
    assert!(!surgeon.rollback(&path).expect("second rollback"));
    assert_eq!(std::fs::read(&path).expect("bytes"), original.as_bytes());
}

#[test]
fn test_replace_is_idempotent_when_pattern_disappears() {
    let (_dir, surgeon, path) = seeded("names.py", "old_name = 1\nprint(old_name)\n");
    let options = ExecuteOptions::default();

    let first = surgeon
        .execute(Operation::Replace, &path, "old_name", Some("new_name"), &options)
        .expect("replace");
    assert_eq!(first.operation_count, 2);
    let after_first = read(&path);

    let second = surgeon
        .execute(Operation::Replace, &path, "old_name", Some("new_name"), &options)
        .expect("replace");
    assert_eq!(second.operation_count, 0);
    assert_eq!(second.status, OperationStatus::Failure);
    assert_eq!(second.metadata["error_kind"], json!("pattern_not_found"));
    assert_eq!(read(&path), after_first);
}

#[test]
fn test_complexity_never_drops_as_nesting_grows() {
    let analyzer = ComplexityAnalyzer::new();
    let mut body = String::from("def run(items):\n");
    let mut previous = analyzer.analyze(&body).score;
    for depth in 1..8 {
        body.push_str(&"    ".repeat(depth));
        body.push_str("for item in items:\n");
        let score = analyzer.analyze(&body).score;
        assert!(score >= previous, "depth {depth}: {score} < {previous}");
        previous = score;
    }
    assert!(analyzer.score(&body) >= analyzer.score("x = 1\n"));
}

#[test]
fn test_literal_and_regex_agree_on_plain_patterns() {
    let text = "let total = count + count_all;\n// count again\ncount";
    let literal = LiteralMatcher::new();
    let regex = RegexMatcher::new(16);
    for options in [
        MatchOptions::default(),
        MatchOptions {
            whole_word: true,
            ..MatchOptions::default()
        },
        MatchOptions {
            case_sensitive: false,
            ..MatchOptions::default()
        },
    ] {
        for pattern in ["count", "total", "again\ncount", "COUNT"] {
            let spans = |found: Vec<surgical_modifier::matcher::Match>| {
                found.into_iter().map(|m| (m.start, m.end)).collect::<Vec<_>>()
            };
            let by_literal = spans(literal.find_all(text, pattern, &options).expect("literal"));
            let by_regex = spans(regex.find_all(text, pattern, &options).expect("regex"));
            assert_eq!(by_literal, by_regex, "pattern {pattern:?} with {options:?}");
        }
    }
}

#[test]
fn test_inferred_kind_drives_selection() {
    let selector = EngineSelector::new(Arc::new(Registry::from_config(&config())));
    let selection = selector.select(&SelectionRequest::default().with_pattern(r"\bfoo_\d+\b"));
    assert_eq!(selection.inferred, Some(Capability::RegexSearch));
    assert_eq!(selection.engine_name, "regex");
}
