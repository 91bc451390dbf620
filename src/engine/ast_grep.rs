//! Structural search through the external `ast-grep` CLI.
//!
//! Content is piped on stdin (`run --pattern P --lang L --json=compact
//! --stdin`) and matches come back as JSON with byte offsets and captured
//! metavariables. Rewrites are rendered here from those captures, so the
//! tool is only ever asked to search.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::capability::{Capability, CapabilitySet, OperationKind};
use crate::error::{SurgeonError, SurgeonResult};
use crate::matcher::{Match, Matcher, PatternFlavor, RegexMatcher};

use super::{EditOutcome, Engine, EngineOptions, splice_with};

const LANGUAGES: &[&str] = &[
    "python", "javascript", "typescript", "tsx", "rust", "go", "java", "c", "cpp", "csharp", "ruby",
    "kotlin", "swift", "lua", "php", "scala", "bash", "html", "css",
];

/// Binary names tried in order when no explicit path is configured.
const BINARIES: &[&str] = &["ast-grep", "sg"];

static VARIADIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$\$[A-Z_][A-Z0-9_]*").expect("BUG: variadic placeholder pattern is invalid"));

#[derive(Debug, Deserialize)]
struct SgMatch {
    text: String,
    range: SgRange,
    #[serde(default, rename = "metaVariables")]
    meta_variables: Option<SgMetaVariables>,
}

#[derive(Debug, Deserialize)]
struct SgRange {
    #[serde(rename = "byteOffset")]
    byte_offset: SgOffsets,
}

#[derive(Debug, Deserialize)]
struct SgOffsets {
    start: usize,
    end: usize,
}

#[derive(Debug, Default, Deserialize)]
struct SgMetaVariables {
    #[serde(default)]
    single: BTreeMap<String, SgNode>,
    #[serde(default)]
    multi: BTreeMap<String, Vec<SgNode>>,
}

#[derive(Debug, Deserialize)]
struct SgNode {
    text: String,
    range: SgRange,
}

#[derive(Debug)]
pub struct AstGrepEngine {
    binary: Option<PathBuf>,
    translate: RegexMatcher,
}

impl AstGrepEngine {
    /// Use `binary` if given, otherwise look for `ast-grep` then `sg` on `PATH`.
    pub fn new(binary: Option<&Path>) -> Self {
        let binary = match binary {
            Some(path) => which::which(path).ok(),
            None => BINARIES.iter().find_map(|b| which::which(b).ok()),
        };
        debug!(binary = ?binary, "ast-grep lookup");
        Self {
            binary,
            translate: RegexMatcher::new(1),
        }
    }

    fn run(&self, content: &str, pattern: &str, language: &str) -> SurgeonResult<Vec<SgMatch>> {
        let binary = self
            .binary
            .as_deref()
            .ok_or_else(|| SurgeonError::EngineUnavailable("ast-grep binary not found".to_owned()))?;

        let mut child = Command::new(binary)
            .args(["run", "--pattern", pattern, "--lang", language, "--json=compact", "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SurgeonError::EngineUnavailable(format!("failed to spawn {}: {e}", binary.display())))?;

        // Feed stdin from a separate thread so a large result cannot deadlock the pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = content.to_owned();
            std::thread::spawn(move || stdin.write_all(input.as_bytes()))
        });
        let output = child
            .wait_with_output()
            .map_err(|e| SurgeonError::EngineUnavailable(format!("ast-grep did not finish: {e}")))?;
        if let Some(handle) = writer {
            if let Ok(Err(e)) = handle.join() {
                debug!(error = %e, "ast-grep closed stdin early");
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Ok(matches) = serde_json::from_str::<Vec<SgMatch>>(stdout.trim()) {
            return Ok(matches);
        }
        if stdout.trim().is_empty() && output.status.success() {
            return Ok(Vec::new());
        }
        Err(SurgeonError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }

    fn language<'a>(&self, opts: &'a EngineOptions) -> SurgeonResult<&'a str> {
        opts.language
            .as_deref()
            .ok_or_else(|| SurgeonError::InvalidRequest("ast-grep needs a language".to_owned()))
    }
}

impl Engine for AstGrepEngine {
    fn name(&self) -> &str {
        "ast-grep"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([
            Capability::StructuralSearch,
            Capability::TreeAware,
            Capability::ContextAware,
            Capability::Multiline,
            Capability::LanguageSpecific,
        ])
    }

    fn supported_languages(&self) -> &'static [&'static str] {
        LANGUAGES
    }

    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn supports_operation(&self, _kind: OperationKind) -> bool {
        self.is_available()
    }

    fn search(&self, content: &str, pattern: &str, opts: &EngineOptions) -> SurgeonResult<Vec<Match>> {
        let language = self.language(opts)?;
        let pattern = if opts.regex {
            self.translate.rewrite_for(pattern, PatternFlavor::AstGrep)
        } else {
            pattern.to_owned()
        };
        let limit = opts.matching.limit.unwrap_or(usize::MAX);
        let raw = self.run(content, &pattern, language)?;
        Ok(raw
            .into_iter()
            .filter_map(|sg| to_match(content, sg))
            .take(limit)
            .collect())
    }

    fn replace(
        &self,
        content: &str,
        pattern: &str,
        replacement: &str,
        opts: &EngineOptions,
    ) -> SurgeonResult<EditOutcome> {
        let matches = self.search(content, pattern, opts)?;
        let out = splice_with(content, &matches, |m| substitute(replacement, &m.named_groups, &m.text));
        Ok(EditOutcome {
            content: out,
            count: matches.len(),
            matches,
        })
    }
}

fn to_match(content: &str, sg: SgMatch) -> Option<Match> {
    let SgOffsets { start, end } = sg.range.byte_offset;
    if content.get(start..end)? != sg.text {
        return None;
    }
    let mut m = Match::at(content, start, end);
    let vars = sg.meta_variables.unwrap_or_default();
    for (name, node) in vars.single {
        m.named_groups.insert(name, node.text);
    }
    for (name, nodes) in vars.multi {
        // Separators come back as nodes too; take the source text spanning them all.
        let text = match (nodes.first(), nodes.last()) {
            (Some(first), Some(last)) => content
                .get(first.range.byte_offset.start..last.range.byte_offset.end)
                .map(str::to_owned)
                .unwrap_or_else(|| nodes.iter().map(|n| n.text.as_str()).collect()),
            _ => String::new(),
        };
        m.named_groups.insert(name, text);
    }
    Some(m)
}

/// Fill `$NAME` and `$$$NAME` placeholders in `template` from `captures`.
///
/// Variadic placeholders with no capture fall back to the text between the
/// outermost parentheses of `original`.
pub fn substitute(template: &str, captures: &BTreeMap<String, String>, original: &str) -> String {
    let mut out = template.to_owned();

    // Longest names first so `$ARG` never eats the front of `$ARGS`.
    let mut names: Vec<&String> = captures.keys().collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    for name in &names {
        out = out.replace(&format!("$$${name}"), &captures[*name]);
    }
    for name in &names {
        out = out.replace(&format!("${name}"), &captures[*name]);
    }

    if out.contains("$$$") {
        if let (Some(open), Some(close)) = (original.find('('), original.rfind(')')) {
            if open < close {
                let args = &original[open + 1..close];
                out = VARIADIC_RE.replace_all(&out, regex::NoExpand(args)).into_owned();
                out = out.replace("$$$", args);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_single_and_variadic() {
        let mut caps = BTreeMap::new();
        caps.insert("FUNC".to_owned(), "load".to_owned());
        caps.insert("ARGS".to_owned(), "a, b".to_owned());
        assert_eq!(substitute("$FUNC_v2($$$ARGS)", &caps, "load(a, b)"), "load_v2(a, b)");
    }

    #[test]
    fn test_substitute_longest_name_first() {
        let mut caps = BTreeMap::new();
        caps.insert("A".to_owned(), "x".to_owned());
        caps.insert("AB".to_owned(), "y".to_owned());
        assert_eq!(substitute("$AB $A", &caps, ""), "y x");
    }

    #[test]
    fn test_variadic_fallback_from_original() {
        let caps = BTreeMap::new();
        assert_eq!(substitute("new_func($$$)", &caps, "old_func(a, b, c)"), "new_func(a, b, c)");
        assert_eq!(substitute("new_func($$$ARGS)", &caps, "old_func(x, y)"), "new_func(x, y)");
    }

    #[test]
    fn test_parse_tool_output() {
        let content = "print(a, b)\n";
        let json = r#"[{"text":"print(a, b)","range":{"byteOffset":{"start":0,"end":11},"start":{"line":0,"column":0},"end":{"line":0,"column":11}},"metaVariables":{"single":{"F":{"text":"print","range":{"byteOffset":{"start":0,"end":5}}}},"multi":{"ARGS":[{"text":"a","range":{"byteOffset":{"start":6,"end":7}}},{"text":",","range":{"byteOffset":{"start":7,"end":8}}},{"text":"b","range":{"byteOffset":{"start":9,"end":10}}}]},"transformed":{}}}]"#;
        let parsed: Vec<SgMatch> = serde_json::from_str(json).expect("valid tool output");
        let m = to_match(content, parsed.into_iter().next().expect("one")).expect("in bounds");
        assert_eq!((m.start, m.end), (0, 11));
        assert_eq!(m.named_groups.get("F").map(String::as_str), Some("print"));
        assert_eq!(m.named_groups.get("ARGS").map(String::as_str), Some("a, b"));
    }

    #[test]
    fn test_out_of_range_offsets_dropped() {
        let sg = SgMatch {
            text: "zzz".to_owned(),
            range: SgRange {
                byte_offset: SgOffsets { start: 0, end: 3 },
            },
            meta_variables: None,
        };
        assert!(to_match("ab", sg).is_none());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let e = AstGrepEngine::new(Some(Path::new("/nonexistent/ast-grep")));
        let opts = EngineOptions {
            language: Some("python".to_owned()),
            ..EngineOptions::default()
        };
        assert!(!e.is_available());
        let err = e.search("x = 1", "$A = $B", &opts).expect_err("no binary");
        assert_eq!(err.kind_tag(), "engine_unavailable");
    }

    #[test]
    fn test_language_required() {
        let e = AstGrepEngine::new(Some(Path::new("/nonexistent/ast-grep")));
        let err = e.search("x", "$A", &EngineOptions::default()).expect_err("needs language");
        assert!(matches!(err, SurgeonError::InvalidRequest(_)));
    }
}
