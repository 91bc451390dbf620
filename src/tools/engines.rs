//! Engines tool: describe the registry, explain a selection, report timings.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::ops::{ExecuteOptions, Operation, Surgeon};
use crate::server::{ToolCallResult, ToolDefinition};
use crate::util::fs::read_text;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnginesParams {
    /// When set, explain which engine this request would get.
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub pattern: String,
    /// File whose content feeds the complexity estimate.
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub regex_mode: bool,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Return the MCP tool definition for `engines`.
pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "engines".to_owned(),
        description: "List registered engines with their capabilities and availability, per-engine \
            call metrics, pending edits, and optionally the ranked selection for a request."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "operation": { "type": "string" },
                "pattern": { "type": "string" },
                "filePath": { "type": "string" },
                "regexMode": { "type": "boolean", "default": false },
                "requiredCapabilities": { "type": "array", "items": { "type": "string" } },
                "language": { "type": "string" }
            }
        }),
    }
}

/// Execute the engines tool.
///
/// # Errors
///
/// Returns an error if the arguments do not parse.
pub fn execute(surgeon: &Surgeon, arguments: serde_json::Value) -> Result<ToolCallResult> {
    let params: EnginesParams = if arguments.is_null() {
        EnginesParams::default()
    } else {
        serde_json::from_value(arguments).context("invalid engines parameters")?
    };

    let registry = surgeon.registry();
    let mut out = json!({
        "engines": registry.describe(),
        "performance": registry.performance_report(),
        "pending": surgeon.pending(),
    });

    if let Some(op) = &params.operation {
        let operation: Operation = match op.parse() {
            Ok(op) => op,
            Err(e) => return Ok(super::text_result(format!("Error: {e}"), true)),
        };
        let (content, language) = match &params.file_path {
            Some(file_path) => {
                let path = match super::resolve(surgeon, file_path) {
                    Ok(p) => p,
                    Err(result) => return Ok(result),
                };
                (
                    read_text(&path).ok(),
                    params
                        .language
                        .clone()
                        .or_else(|| crate::language::detect(&path).map(str::to_owned)),
                )
            }
            None => (None, params.language.clone()),
        };
        let options = ExecuteOptions {
            regex_mode: params.regex_mode,
            required_capabilities: params.required_capabilities.clone(),
            language,
            ..ExecuteOptions::default()
        };
        let selection = surgeon.explain(operation, &params.pattern, content.as_deref(), &options);
        out["selection"] = serde_json::to_value(&selection).context("failed to serialize selection")?;
    }

    super::json_result(&out, false)
}
