//! Settings read from `<workspace>/.surgeon/config.toml`.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! Values are range-checked after parsing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SurgeonError, SurgeonResult};
use crate::matcher::fuzzy::DEFAULT_THRESHOLD;
use crate::selector::ScoringPolicy;
use crate::util::fs::read_text;

/// Directory holding config and backups, relative to the workspace.
pub const SURGEON_DIR: &str = ".surgeon";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeonConfig {
    pub matching: MatchingConfig,
    pub backup: BackupConfig,
    pub engines: EnginesConfig,
    pub selector: ScoringPolicy,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub fuzzy_threshold: f64,
    pub regex_cache_size: usize,
    pub auto_escape: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_THRESHOLD,
            regex_cache_size: 256,
            auto_escape: true,
        }
    }
}

/// What to do when the pre-edit snapshot cannot be written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupPolicy {
    /// Log a warning and edit anyway.
    #[default]
    FailOpen,
    /// Refuse the edit.
    FailClosed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Relative paths resolve against the workspace.
    pub directory: PathBuf,
    pub policy: BackupPolicy,
    pub max_snapshots: usize,
    /// Keep snapshots in memory only.
    pub in_memory: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: Path::new(SURGEON_DIR).join("backups"),
            policy: BackupPolicy::FailOpen,
            max_snapshots: 50,
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// Built-in engines to leave out of the registry.
    pub disabled: Vec<String>,
    /// Explicit `ast-grep` executable instead of a `PATH` lookup.
    pub ast_grep_binary: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# surgical-modifier configuration

[matching]
# Minimum similarity (0.0 - 1.0) for fuzzy matches
fuzzy_threshold = 0.6
# Compiled regex patterns kept in memory
regex_cache_size = 256
# Escape regex input that reads as plain text
auto_escape = true

[backup]
directory = ".surgeon/backups"
# "fail-open" edits even when the snapshot fails, "fail-closed" refuses
policy = "fail-open"
max_snapshots = 50
in_memory = false

[engines]
# Built-in engines to skip: literal, regex, fuzzy, block, ast-grep
disabled = []

[validation]
# Re-check structure after every edit
enabled = true
"#;

impl SurgeonConfig {
    pub fn path_in(workspace: &Path) -> PathBuf {
        workspace.join(SURGEON_DIR).join(CONFIG_FILE)
    }

    /// Load the workspace config, or defaults when there is none.
    pub fn load(workspace: &Path) -> SurgeonResult<Self> {
        let path = Self::path_in(workspace);
        if !path.is_file() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = read_text(&path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| SurgeonError::Config(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> SurgeonResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SurgeonError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SurgeonResult<()> {
        let t = self.matching.fuzzy_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(SurgeonError::Config(format!(
                "matching.fuzzy_threshold must be within 0.0..=1.0, got {t}"
            )));
        }
        if self.matching.regex_cache_size == 0 {
            return Err(SurgeonError::Config("matching.regex_cache_size must be at least 1".to_owned()));
        }
        if self.backup.max_snapshots == 0 {
            return Err(SurgeonError::Config("backup.max_snapshots must be at least 1".to_owned()));
        }
        Ok(())
    }

    /// Backup directory resolved against `workspace`.
    pub fn backup_dir(&self, workspace: &Path) -> PathBuf {
        if self.backup.directory.is_absolute() {
            self.backup.directory.clone()
        } else {
            workspace.join(&self.backup.directory)
        }
    }

    /// Write a commented default config unless one exists. Returns its path.
    pub fn init(workspace: &Path) -> SurgeonResult<PathBuf> {
        let path = Self::path_in(workspace);
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| SurgeonError::fs(dir, e))?;
        }
        std::fs::write(&path, DEFAULT_CONFIG_TOML).map_err(|e| SurgeonError::fs(&path, e))?;
        info!(path = %path.display(), "created default config");
        Ok(path)
    }
}
