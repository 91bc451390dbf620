//! Execute tool: run one mutation or search against a workspace file.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ops::{ExecuteOptions, Operation, OperationStatus, Surgeon};
use crate::server::{ToolCallResult, ToolDefinition};

/// Parameters for the execute tool.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams {
    pub file_path: String,
    pub operation: String,
    #[serde(default)]
    pub pattern: String,
    /// Replacement or inserted text.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub regex_mode: bool,
    #[serde(default = "default_unlimited")]
    pub max_replacements: i64,
    #[serde(default)]
    pub preview_only: bool,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_unlimited() -> i64 {
    -1
}

impl ExecuteParams {
    fn options(&self) -> ExecuteOptions {
        ExecuteOptions {
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word,
            regex_mode: self.regex_mode,
            max_replacements: self.max_replacements,
            preview_only: self.preview_only,
            required_capabilities: self.required_capabilities.clone(),
            language: self.language.clone(),
            engine: self.engine.clone(),
        }
    }
}

/// Return the MCP tool definition for `execute`.
pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "execute".to_owned(),
        description: "Search, replace, insert, delete or append in a file. The best matching engine \
            (literal, regex, fuzzy, block, ast-grep) is chosen automatically. Destructive edits are \
            snapshotted first and can be undone with `rollback` until `commit`."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace or absolute"
                },
                "operation": {
                    "type": "string",
                    "enum": ["search", "replace", "insert_before", "insert_after", "delete", "append"]
                },
                "pattern": {
                    "type": "string",
                    "description": "Text or regex locating the target. May be empty for append (end of file)"
                },
                "content": {
                    "type": "string",
                    "description": "Replacement or inserted text"
                },
                "caseSensitive": { "type": "boolean", "default": true },
                "wholeWord": { "type": "boolean", "default": false },
                "regexMode": { "type": "boolean", "default": false },
                "maxReplacements": {
                    "type": "integer",
                    "description": "Maximum edit sites, -1 for unlimited",
                    "default": -1
                },
                "previewOnly": {
                    "type": "boolean",
                    "description": "Return the edit and diff without writing",
                    "default": false
                },
                "requiredCapabilities": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "e.g. structural-search, tree-aware"
                },
                "language": { "type": "string" },
                "engine": {
                    "type": "string",
                    "description": "Use this engine instead of automatic selection"
                }
            },
            "required": ["filePath", "operation"]
        }),
    }
}

/// Execute the execute tool.
///
/// # Errors
///
/// Returns an error if the arguments do not parse or the request is malformed.
pub fn execute(surgeon: &Surgeon, arguments: serde_json::Value) -> Result<ToolCallResult> {
    let params: ExecuteParams =
        serde_json::from_value(arguments).context("invalid execute parameters")?;

    let operation: Operation = match params.operation.parse() {
        Ok(op) => op,
        Err(e) => return Ok(super::text_result(format!("Error: {e}"), true)),
    };
    let path = match super::resolve(surgeon, &params.file_path) {
        Ok(p) => p,
        Err(result) => return Ok(result),
    };

    let result = surgeon
        .execute(
            operation,
            &path,
            &params.pattern,
            params.content.as_deref(),
            &params.options(),
        )
        .with_context(|| format!("{operation} on {}", path.display()))?;

    let is_error = matches!(
        result.status,
        OperationStatus::Failure | OperationStatus::NotSupported
    );
    super::json_result(&result.to_json(), is_error)
}
