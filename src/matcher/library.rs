//! Reusable sub-patterns for common source constructs, and the rewrites that
//! carry a pattern from one backend dialect to another.

use std::sync::LazyLock;

use regex::Regex;

/// Named regex building blocks, most specific first.
pub const COMMON_PATTERNS: &[(&str, &str)] = &[
    (
        "function_def",
        r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:async[ \t]+)?(?:def|fn|function)[ \t]+(?P<name>[A-Za-z_][A-Za-z0-9_]*)[ \t]*(?:<[^>\n]*>)?\((?P<params>[^)]*)\)",
    ),
    (
        "class_def",
        r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:class|struct)[ \t]+(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
    ),
    (
        "import",
        r"(?m)^[ \t]*(?:from[ \t]+(?P<module>[\w.]+)[ \t]+import[ \t]+(?P<names>[^\n]+)|import[ \t]+(?P<target>[^\n;]+)|use[ \t]+(?P<path>[^\n;]+);)",
    ),
    ("decorator", r"(?m)^[ \t]*@(?P<name>[\w.]+)"),
    ("url", r#"https?://[^\s"'<>)]+"#),
    ("number", r"-?\b\d+(?:\.\d+)?(?:[eE][+-]?\d+)?\b"),
    ("string_literal", r#""(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'"#),
    ("identifier", r"[A-Za-z_][A-Za-z0-9_]*"),
];

/// Look up a named sub-pattern.
pub fn common_pattern(name: &str) -> Option<&'static str> {
    COMMON_PATTERNS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, p)| *p)
}

static NAMED_GROUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\?P?<([A-Za-z_][A-Za-z0-9_]*)>[^()]*\)")
        .expect("BUG: named group rewrite pattern is invalid")
});

static INLINE_FLAGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\?[imsxU]+\)").expect("BUG: inline flag pattern is invalid"));

static ESCAPED_PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\([^A-Za-z0-9\s])").expect("BUG: escaped punctuation pattern is invalid")
});

/// Argument-list forms, rewritten before identifiers so `\(\w+\)` stays one token.
const ARG_FORMS: &[&str] = &[r"\([^)]*\)", r"\(.*\)", r"\(.+\)", r"\(.*?\)"];

/// Identifier forms, longest first.
const IDENT_FORMS: &[&str] = &[
    r"[A-Za-z_][A-Za-z0-9_]*",
    r"[a-zA-Z_][a-zA-Z0-9_]*",
    r"[A-Za-z_]\w*",
    r"[a-zA-Z_]\w*",
    r"\w+",
];

const WILDCARD_FORMS: &[&str] = &[r"[^\n]*", r".*?", r".+?", ".*", ".+"];

const WHITESPACE_FORMS: &[(&str, &str)] = &[
    (r"\s+", " "),
    (r"[ \t]+", " "),
    (r"\s*", ""),
    (r"[ \t]*", ""),
];

/// Rewrite a regex into an ast-grep template.
///
/// Named groups become `$NAME` metavariables after the group name, bare
/// identifier classes become `$NAME`, `$NAME2`, ..., argument lists become
/// `($$$ARGS)` and wildcards become `$$$`. Anchors, inline flags and
/// punctuation escapes are dropped.
pub fn regex_to_ast_grep(pattern: &str) -> String {
    let mut out = NAMED_GROUP_RE
        .replace_all(pattern, |caps: &regex::Captures<'_>| {
            format!("${}", caps[1].to_ascii_uppercase())
        })
        .into_owned();

    for form in ARG_FORMS {
        out = out.replace(form, "($$$ARGS)");
    }

    let mut counter = 0usize;
    for form in IDENT_FORMS {
        while let Some(pos) = out.find(form) {
            counter += 1;
            let var = if counter == 1 {
                "$NAME".to_owned()
            } else {
                format!("$NAME{counter}")
            };
            out.replace_range(pos..pos + form.len(), &var);
        }
    }

    for form in WILDCARD_FORMS {
        out = out.replace(form, "$$$");
    }
    for (form, with) in WHITESPACE_FORMS {
        out = out.replace(form, with);
    }

    out = INLINE_FLAGS_RE.replace_all(&out, "").into_owned();
    let trimmed = out.strip_prefix('^').unwrap_or(&out);
    let trimmed = trimmed
        .strip_suffix('$')
        .filter(|s| !s.ends_with('$'))
        .unwrap_or(trimmed);
    ESCAPED_PUNCT_RE.replace_all(trimmed, "$1").trim().to_owned()
}

/// Regex matching `pattern`'s words separated by any whitespace run.
pub fn whitespace_tolerant_regex(pattern: &str) -> String {
    pattern
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(common_pattern("function_def").is_some());
        assert!(common_pattern("nope").is_none());
    }

    #[test]
    fn test_library_patterns_compile() {
        for (name, pattern) in COMMON_PATTERNS {
            assert!(Regex::new(pattern).is_ok(), "{name} does not compile");
        }
    }

    #[test]
    fn test_function_def_captures_name() {
        let re = Regex::new(common_pattern("function_def").expect("present")).expect("compiles");
        let caps = re.captures("    async def fetch(url, retries=3):").expect("match");
        assert_eq!(&caps["name"], "fetch");
        assert_eq!(&caps["params"], "url, retries=3");
        let caps = re.captures("pub fn parse<T>(input: &str) -> T {").expect("match");
        assert_eq!(&caps["name"], "parse");
    }

    #[test]
    fn test_named_group_becomes_metavariable() {
        assert_eq!(
            regex_to_ast_grep(r"def\s+(?P<func>\w+)\(.*\):"),
            "def $FUNC($$$ARGS):"
        );
    }

    #[test]
    fn test_bare_identifiers_numbered() {
        assert_eq!(regex_to_ast_grep(r"\w+\s*=\s*\w+"), "$NAME=$NAME2");
    }

    #[test]
    fn test_anchors_and_flags_dropped() {
        assert_eq!(regex_to_ast_grep(r"(?m)^console\.log\(.*\)$"), "console.log($$$ARGS)");
    }

    #[test]
    fn test_whitespace_tolerant() {
        let re = Regex::new(&whitespace_tolerant_regex("let x = 1;")).expect("compiles");
        assert!(re.is_match("let   x\t=  1;"));
    }
}
