//! Language detection from file names.
//!
//! Names are the ones ast-grep accepts for `--lang` and the ones the
//! selector's affinity table is keyed by.

use std::path::Path;
use std::sync::LazyLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::warn;

const LANGUAGE_GLOBS: &[(&str, &[&str])] = &[
    ("python", &["*.py", "*.pyi", "*.pyw"]),
    ("rust", &["*.rs"]),
    ("typescript", &["*.ts", "*.tsx", "*.mts", "*.cts"]),
    ("javascript", &["*.js", "*.jsx", "*.mjs", "*.cjs"]),
    ("go", &["*.go"]),
    ("java", &["*.java"]),
    ("kotlin", &["*.kt", "*.kts"]),
    ("c", &["*.c", "*.h"]),
    ("cpp", &["*.cc", "*.cpp", "*.cxx", "*.hpp", "*.hh"]),
    ("csharp", &["*.cs"]),
    ("ruby", &["*.rb", "Rakefile", "Gemfile"]),
    ("php", &["*.php"]),
    ("swift", &["*.swift"]),
    ("lua", &["*.lua"]),
    ("bash", &["*.sh", "*.bash", ".bashrc"]),
    ("yaml", &["*.yml", "*.yaml"]),
    ("json", &["*.json"]),
    ("toml", &["*.toml"]),
    ("html", &["*.html", "*.htm"]),
    ("css", &["*.css", "*.scss"]),
    ("coffeescript", &["*.coffee"]),
    ("nim", &["*.nim", "*.nims"]),
    ("gdscript", &["*.gd"]),
];

struct Detector {
    set: GlobSet,
    /// Language for each glob, by glob index.
    languages: Vec<&'static str>,
}

static DETECTOR: LazyLock<Detector> = LazyLock::new(build_detector);

fn build_detector() -> Detector {
    let mut builder = GlobSetBuilder::new();
    let mut languages = Vec::new();
    for (language, globs) in LANGUAGE_GLOBS {
        for pattern in *globs {
            match GlobBuilder::new(pattern).case_insensitive(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                    languages.push(*language);
                }
                Err(e) => warn!(pattern, error = %e, "skipping language glob"),
            }
        }
    }
    let set = builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "language globs failed to compile, detection disabled");
        GlobSet::empty()
    });
    Detector { set, languages }
}

/// Language of `path`, judged from its file name.
pub fn detect(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?;
    let detector = &*DETECTOR;
    detector
        .set
        .matches(name)
        .into_iter()
        .min()
        .and_then(|i| detector.languages.get(i).copied())
}

/// Every language name the detector can produce.
pub fn known() -> impl Iterator<Item = &'static str> {
    LANGUAGE_GLOBS.iter().map(|(l, _)| *l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect(Path::new("src/app/main.py")), Some("python"));
        assert_eq!(detect(Path::new("lib.rs")), Some("rust"));
        assert_eq!(detect(Path::new("Component.TSX")), Some("typescript"));
        assert_eq!(detect(Path::new("deploy/values.yaml")), Some("yaml"));
        assert_eq!(detect(Path::new("Gemfile")), Some("ruby"));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(detect(Path::new("README")), None);
        assert_eq!(detect(Path::new("notes.txt")), None);
        assert_eq!(detect(Path::new("/")), None);
    }

    #[test]
    fn test_known_names_unique() {
        let mut names: Vec<_> = known().collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
