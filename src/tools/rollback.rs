//! Rollback tool: undo uncommitted edits.

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use crate::ops::Surgeon;
use crate::server::{ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackParams {
    #[serde(default)]
    pub file_path: Option<String>,
    /// Restore this snapshot from the backup store instead.
    #[serde(default)]
    pub snapshot_id: Option<Uuid>,
    /// Roll back every pending file.
    #[serde(default)]
    pub all: bool,
}

/// Return the MCP tool definition for `rollback`.
pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "rollback".to_owned(),
        description: "Restore a file to its content before its first uncommitted edit. \
            Give filePath, a snapshotId from an earlier result, or all=true."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "filePath": { "type": "string" },
                "snapshotId": { "type": "string", "format": "uuid" },
                "all": { "type": "boolean", "default": false }
            }
        }),
    }
}

/// Execute the rollback tool.
///
/// # Errors
///
/// Returns an error if the arguments do not parse or the file cannot be restored.
pub fn execute(surgeon: &Surgeon, arguments: serde_json::Value) -> Result<ToolCallResult> {
    let params: RollbackParams =
        serde_json::from_value(arguments).context("invalid rollback parameters")?;

    if params.all {
        let restored = surgeon.rollback_all().context("rollback of pending edits failed")?;
        return Ok(super::text_result(format!("Rolled back {restored} file(s)"), false));
    }

    if let Some(id) = params.snapshot_id {
        let restored = surgeon
            .restore_snapshot(id)
            .with_context(|| format!("failed to restore snapshot {id}"))?;
        return Ok(if restored {
            super::text_result(format!("Restored snapshot {id}"), false)
        } else {
            super::text_result(format!("Error: no snapshot {id}"), true)
        });
    }

    let Some(file_path) = params.file_path else {
        return Ok(super::text_result("Error: give filePath, snapshotId or all", true));
    };
    let path = match super::resolve(surgeon, &file_path) {
        Ok(p) => p,
        Err(result) => return Ok(result),
    };
    let restored = surgeon
        .rollback(&path)
        .with_context(|| format!("failed to roll back {}", path.display()))?;
    Ok(super::text_result(
        if restored {
            format!("Rolled back {}", path.display())
        } else {
            format!("Nothing to roll back for {}", path.display())
        },
        false,
    ))
}
