//! MCP server: newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Every tool call runs against one shared [`Surgeon`](crate::Surgeon), so
//! an `execute` can be undone by a later `rollback` in the same session.
//! Edits still pending when the client hangs up are reported on stderr and
//! left in place.
//!
//! Error mapping for `tools/call`:
//! - arguments that do not deserialize, and requests the surgeon rejects
//!   as malformed (`invalid_request`), are JSON-RPC `-32602` errors with
//!   `data.errorKind`;
//! - any other failure, a path outside the workspace included, comes back
//!   as content with `isError: true`, so the model gets to read it.
//!
//! A line that is too long or not UTF-8 gets an error response with a null
//! id; the session carries on.

use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::SurgeonError;
use crate::tools::{ToolRouter, text_result};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Longest request line accepted, newline excluded.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

const INSTRUCTIONS: &str = "Use `engines` to see which engine a request would pick, `execute` to \
    search or edit a file, then `commit` to keep the edit or `rollback` to restore the original.";

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The standard JSON-RPC error codes this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl RpcCode {
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

impl JsonRpcError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    fn with_kind(mut self, kind: &str) -> Self {
        self.data = Some(json!({ "errorKind": kind }));
        self
    }

    /// `Some` when a failed tool call was the caller's fault rather than the tool's.
    fn for_rejected_call(err: &anyhow::Error) -> Option<Self> {
        let message = format!("{err:#}");
        if let Some(surgeon) = err.downcast_ref::<SurgeonError>() {
            return matches!(surgeon, SurgeonError::InvalidRequest(_))
                .then(|| Self::new(RpcCode::InvalidParams, message).with_kind(surgeon.kind_tag()));
        }
        err.downcast_ref::<serde_json::Error>()
            .map(|_| Self::new(RpcCode::InvalidParams, message).with_kind("invalid_arguments"))
    }
}

/// MCP tool definition for tools/list.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// MCP content item in a tools/call response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// MCP tools/call result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Root that every tool path must stay inside. Also holds `.surgeon/`.
    pub workspace: PathBuf,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
        }
    }
}

/// One newline-terminated frame off the transport.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Eof,
    Line(String),
    TooLong,
    NotUtf8,
}

/// Read one line of at most `max_bytes` (newline excluded).
///
/// Bytes are collected first and decoded once, so a multi-byte character
/// split across reads is fine. An oversized line is skipped up to its
/// newline.
fn read_frame(reader: &mut impl BufRead, max_bytes: usize) -> std::io::Result<Frame> {
    let mut bytes = Vec::new();
    let cap = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    if reader.by_ref().take(cap).read_until(b'\n', &mut bytes)? == 0 {
        return Ok(Frame::Eof);
    }
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    } else if bytes.len() > max_bytes {
        skip_line(reader)?;
        return Ok(Frame::TooLong);
    }
    Ok(String::from_utf8(bytes).map_or(Frame::NotUtf8, Frame::Line))
}

fn skip_line(reader: &mut impl BufRead) -> std::io::Result<()> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(());
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = buf.len();
        reader.consume(len);
    }
}

fn write_response(out: &mut impl Write, resp: &JsonRpcResponse) -> Result<()> {
    let line = serde_json::to_string(resp).context("failed to serialize response")?;
    debug!(response = line, "sending response");
    out.write_all(line.as_bytes())
        .and_then(|()| out.write_all(b"\n"))
        .and_then(|()| out.flush())
        .context("failed to write response")
}

#[derive(Debug)]
pub struct McpServer {
    router: ToolRouter,
}

impl McpServer {
    pub const fn new(router: ToolRouter) -> Self {
        Self { router }
    }

    pub const fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Answer requests from `reader` on `writer` until EOF.
    ///
    /// # Errors
    ///
    /// Only transport I/O failures end the session.
    pub fn serve(&self, mut reader: impl BufRead, mut writer: impl Write) -> Result<()> {
        loop {
            let response = match read_frame(&mut reader, MAX_LINE_BYTES).context("failed to read request")? {
                Frame::Eof => break,
                Frame::Line(line) => self.handle_line(&line),
                Frame::TooLong => {
                    warn!(limit = MAX_LINE_BYTES, "request line too long");
                    Some(JsonRpcResponse::err(
                        None,
                        JsonRpcError::new(
                            RpcCode::InvalidRequest,
                            format!("request line exceeds {MAX_LINE_BYTES} bytes"),
                        ),
                    ))
                }
                Frame::NotUtf8 => {
                    warn!("request line is not UTF-8");
                    Some(JsonRpcResponse::err(
                        None,
                        JsonRpcError::new(RpcCode::ParseError, "request is not valid UTF-8"),
                    ))
                }
            };
            if let Some(resp) = response {
                write_response(&mut writer, &resp)?;
            }
        }

        let pending = self.router.surgeon().pending();
        if !pending.is_empty() {
            warn!(
                files = pending.len(),
                "client disconnected with uncommitted edits; files keep their edited content"
            );
        }
        info!("client disconnected");
        Ok(())
    }

    /// Parse and answer one request line. `None` for blank lines and notifications.
    pub fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        debug!(raw = line, "received request");

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "request is not JSON");
                return Some(JsonRpcResponse::err(
                    None,
                    JsonRpcError::new(RpcCode::ParseError, format!("parse error: {e}")),
                ));
            }
        };
        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(&request),
            Err(e) => Some(JsonRpcResponse::err(
                id,
                JsonRpcError::new(RpcCode::InvalidRequest, format!("invalid request: {e}")),
            )),
        }
    }

    pub fn handle(&self, req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        if req.jsonrpc != "2.0" {
            warn!(version = req.jsonrpc, "unsupported JSON-RPC version");
            return Some(JsonRpcResponse::err(
                req.id.clone(),
                JsonRpcError::new(
                    RpcCode::InvalidRequest,
                    format!("jsonrpc must be \"2.0\", got {:?}", req.jsonrpc),
                ),
            ));
        }

        let outcome = match req.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") },
                "instructions": INSTRUCTIONS,
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.router.list_tools() })),
            "tools/call" => self.call_tool(&req.params),
            method if method.starts_with("notifications/") => {
                debug!(method, "notification");
                return None;
            }
            method => {
                warn!(method, "unknown method");
                Err(JsonRpcError::new(
                    RpcCode::MethodNotFound,
                    format!("method not found: {method}"),
                ))
            }
        };

        // Requests without an id are notifications: run them, answer nothing.
        let id = req.id.clone()?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::ok(Some(id), result),
            Err(error) => JsonRpcResponse::err(Some(id), error),
        })
    }

    fn call_tool(&self, params: &Value) -> Result<Value, JsonRpcError> {
        let call: ToolCallParams = serde_json::from_value(params.clone()).map_err(|e| {
            JsonRpcError::new(RpcCode::InvalidParams, format!("invalid tools/call params: {e}"))
        })?;

        let result = match self.router.call_tool(&call.name, call.arguments) {
            Ok(result) => result,
            Err(e) => {
                if let Some(rejected) = JsonRpcError::for_rejected_call(&e) {
                    debug!(tool = call.name, error = %rejected.message, "tool call rejected");
                    return Err(rejected);
                }
                warn!(tool = call.name, error = %format!("{e:#}"), "tool call failed");
                text_result(format!("Error: {e:#}"), true)
            }
        };
        serde_json::to_value(result).map_err(|e| {
            JsonRpcError::new(RpcCode::InternalError, format!("failed to serialize tool result: {e}"))
        })
    }
}

/// Serve the workspace over stdin/stdout until the client closes stdin.
///
/// # Errors
///
/// Returns an error if the workspace config is invalid or stdio fails.
pub fn run_mcp_server(config: McpServerConfig) -> Result<()> {
    info!(workspace = %config.workspace.display(), "surgical-modifier MCP server starting");
    let server = McpServer::new(ToolRouter::new(config.workspace)?);
    server.serve(std::io::stdin().lock(), std::io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor};

    use super::*;
    use crate::config::SurgeonConfig;
    use crate::ops::Surgeon;

    fn server() -> (tempfile::TempDir, McpServer) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = SurgeonConfig::default();
        config.backup.in_memory = true;
        config.engines.disabled = vec!["ast-grep".to_owned()];
        let surgeon = Surgeon::with_config(dir.path(), config);
        (dir, McpServer::new(ToolRouter::with_surgeon(surgeon)))
    }

    fn request(id: Option<Value>, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_owned(),
            id,
            method: method.to_owned(),
            params,
        }
    }

    fn call(server: &McpServer, arguments: Value) -> JsonRpcResponse {
        let params = json!({ "name": "execute", "arguments": arguments });
        server
            .handle(&request(Some(3.into()), "tools/call", params))
            .expect("response")
    }

    /// Feed `input` through `serve` and collect the response lines.
    fn session(server: &McpServer, input: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();
        server
            .serve(BufReader::with_capacity(8, input), &mut out)
            .expect("serve");
        String::from_utf8(out)
            .expect("utf8 output")
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect()
    }

    #[test]
    fn test_initialize_names_server() {
        let (_dir, server) = server();
        let resp = server
            .handle(&request(Some(1.into()), "initialize", json!({})))
            .expect("response");
        let result = resp.result.expect("result");
        assert_eq!(result["serverInfo"]["name"], "surgical-modifier");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["instructions"].as_str().expect("text").contains("rollback"));
    }

    #[test]
    fn test_notifications_have_no_response() {
        let (_dir, server) = server();
        for method in ["notifications/initialized", "notifications/cancelled"] {
            assert!(server.handle(&request(None, method, Value::Null)).is_none(), "{method}");
        }
        // Any method sent without an id is a notification.
        assert!(server.handle(&request(None, "ping", Value::Null)).is_none());
    }

    #[test]
    fn test_unknown_method() {
        let (_dir, server) = server();
        let resp = server
            .handle(&request(Some(7.into()), "resources/list", Value::Null))
            .expect("response");
        assert_eq!(resp.error.expect("error").code, -32601);
    }

    #[test]
    fn test_tools_call_bad_params() {
        let (_dir, server) = server();
        let resp = server
            .handle(&request(Some(2.into()), "tools/call", json!({"x": 1})))
            .expect("response");
        assert_eq!(resp.error.expect("error").code, -32602);
    }

    #[test]
    fn test_bad_tool_arguments_are_invalid_params() {
        let (_dir, server) = server();
        let missing_path = call(&server, json!({"operation": "search"}));
        let error = missing_path.error.expect("error");
        assert_eq!(error.code, RpcCode::InvalidParams.code());
        assert_eq!(error.data.expect("data")["errorKind"], "invalid_arguments");
        assert!(missing_path.result.is_none());
    }

    #[test]
    fn test_rejected_request_carries_error_kind() {
        let (dir, server) = server();
        std::fs::write(dir.path().join("a.txt"), "x\n").expect("seed");
        let resp = call(
            &server,
            json!({"filePath": "a.txt", "operation": "replace", "pattern": "x"}),
        );
        let error = resp.error.expect("error");
        assert_eq!(error.code, -32602);
        assert!(error.message.contains("needs content"), "{}", error.message);
        assert_eq!(error.data.expect("data")["errorKind"], "invalid_request");
    }

    #[test]
    fn test_failed_edit_is_tool_content() {
        let (dir, server) = server();
        std::fs::write(dir.path().join("a.txt"), "x\n").expect("seed");
        let resp = call(
            &server,
            json!({"filePath": "a.txt", "operation": "delete", "pattern": "absent"}),
        );
        let result = resp.result.expect("result");
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().expect("text").contains("pattern_not_found"));
    }

    #[test]
    fn test_frame_decodes_multibyte_across_reads() {
        let input = "{\"a\":\"中文\"}\nnext\n".as_bytes();
        let mut reader = BufReader::with_capacity(8, input);
        assert_eq!(
            read_frame(&mut reader, 64).expect("frame"),
            Frame::Line("{\"a\":\"中文\"}".to_owned())
        );
        assert_eq!(read_frame(&mut reader, 64).expect("frame"), Frame::Line("next".to_owned()));
        assert_eq!(read_frame(&mut reader, 64).expect("frame"), Frame::Eof);
    }

    #[test]
    fn test_frame_limits() {
        let mut reader = Cursor::new(b"0123456789\nnext".to_vec());
        assert_eq!(read_frame(&mut reader, 4).expect("frame"), Frame::TooLong);
        assert_eq!(read_frame(&mut reader, 4).expect("frame"), Frame::Line("next".to_owned()));

        let mut exact = Cursor::new(b"abcd\n".to_vec());
        assert_eq!(read_frame(&mut exact, 4).expect("frame"), Frame::Line("abcd".to_owned()));

        let mut invalid = Cursor::new(b"\xff\xfe\nok\n".to_vec());
        assert_eq!(read_frame(&mut invalid, 64).expect("frame"), Frame::NotUtf8);
        assert_eq!(read_frame(&mut invalid, 64).expect("frame"), Frame::Line("ok".to_owned()));
    }

    #[test]
    fn test_session_survives_bad_lines() {
        let (_dir, server) = server();
        let mut input = b"\xc3\x28\n".to_vec();
        input.extend_from_slice(b"not json\n\n");
        input.extend_from_slice(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
        input.push(b'\n');
        input.extend_from_slice("{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ping\",\"params\":{\"note\":\"é\"}}\n".as_bytes());
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":10}"#);

        let responses = session(&server, &input);
        assert_eq!(responses.len(), 4, "{responses:?}");
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["error"]["code"], -32700);
        assert_eq!(responses[2]["id"], 9);
        assert_eq!(responses[2]["result"], json!({}));
        assert_eq!(responses[3]["id"], 10);
        assert_eq!(responses[3]["error"]["code"], -32600);
    }
}
