//! Tool router: registers and dispatches MCP tool calls.
//!
//! Each tool is a function that takes JSON arguments and returns a
//! [`ToolCallResult`]. All of them share one [`Surgeon`], so an edit made
//! through `execute` can be rolled back or committed by a later call.

pub mod commit;
pub mod engines;
pub mod execute;
pub mod rollback;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::ops::Surgeon;
use crate::server::{ContentItem, ToolCallResult, ToolDefinition};

/// A single text content item.
pub fn text_result(text: impl Into<String>, is_error: bool) -> ToolCallResult {
    ToolCallResult {
        content: vec![ContentItem {
            content_type: "text".to_owned(),
            text: text.into(),
        }],
        is_error,
    }
}

/// Pretty JSON as a text content item.
pub fn json_result(value: &serde_json::Value, is_error: bool) -> Result<ToolCallResult> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize tool output")?;
    Ok(text_result(text, is_error))
}

/// Tool router that dispatches MCP tool calls to implementations.
pub struct ToolRouter {
    surgeon: Surgeon,
}

impl ToolRouter {
    /// Build a router over `workspace`, reading its `.surgeon/config.toml` if present.
    pub fn new(workspace: PathBuf) -> Result<Self> {
        let surgeon = Surgeon::open(&workspace)
            .with_context(|| format!("failed to load configuration for {}", workspace.display()))?;
        Ok(Self { surgeon })
    }

    pub const fn with_surgeon(surgeon: Surgeon) -> Self {
        Self { surgeon }
    }

    pub const fn surgeon(&self) -> &Surgeon {
        &self.surgeon
    }

    /// List all available tools with their JSON Schema definitions.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            execute::tool_definition(),
            rollback::tool_definition(),
            commit::tool_definition(),
            engines::tool_definition(),
        ]
    }

    /// Call a tool by name with the given JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments do not parse or the tool fails outright.
    pub fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolCallResult> {
        debug!(tool = name, "dispatching tool call");

        match name {
            "execute" => execute::execute(&self.surgeon, arguments),
            "rollback" => rollback::execute(&self.surgeon, arguments),
            "commit" => commit::execute(&self.surgeon, arguments),
            "engines" => engines::execute(&self.surgeon, arguments),
            _ => Ok(text_result(format!("Unknown tool: {name}"), true)),
        }
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("workspace", &self.surgeon.workspace())
            .finish_non_exhaustive()
    }
}

/// Resolve a tool's `filePath` argument, turning a boundary violation into an error result.
fn resolve(surgeon: &Surgeon, file_path: &str) -> std::result::Result<PathBuf, ToolCallResult> {
    surgeon
        .confine(Path::new(file_path))
        .map_err(|e| text_result(format!("Error: {e}"), true))
}
