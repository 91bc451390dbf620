//! Commit tool: accept the edits made to a file.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ops::Surgeon;
use crate::server::{ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitParams {
    pub file_path: String,
}

/// Return the MCP tool definition for `commit`.
pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "commit".to_owned(),
        description: "Accept the pending edits to a file. Afterwards `rollback` no longer applies to them."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "filePath": { "type": "string" }
            },
            "required": ["filePath"]
        }),
    }
}

/// Execute the commit tool.
///
/// # Errors
///
/// Returns an error if the arguments do not parse.
pub fn execute(surgeon: &Surgeon, arguments: serde_json::Value) -> Result<ToolCallResult> {
    let params: CommitParams =
        serde_json::from_value(arguments).context("invalid commit parameters")?;
    let path = match super::resolve(surgeon, &params.file_path) {
        Ok(p) => p,
        Err(result) => return Ok(result),
    };
    let text = if surgeon.commit(&path) {
        format!("Committed {}", path.display())
    } else {
        format!("No pending edits for {}", path.display())
    };
    Ok(super::text_result(text, false))
}
