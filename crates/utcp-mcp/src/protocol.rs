//! Minimal MCP JSON-RPC wire types.
//!
//! Scoped to exactly what the multiplexer needs — `initialize`, `tools/list`,
//! `tools/call`, and (for `register_resources_as_tools`) `resources/list` /
//! `resources/read` — kept as a small self-contained module rather than
//! pulling in a full protocol crate, since a client-side multiplexer only
//! speaks a handful of methods.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    /// Present on server->client notifications/requests the client doesn't
    /// need to act on (e.g. `notifications/message`); used to skip them
    /// while scanning for a matching response.
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: &'static str,
    pub capabilities: Value,
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION,
            capabilities: serde_json::json!({}),
            client_info: Implementation {
                name: "utcp-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    #[allow(dead_code)]
    pub protocol_version: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub capabilities: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
    #[serde(rename = "outputSchema", default)]
    pub output_schema: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpTool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpResource {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResourcesResult {
    #[serde(default)]
    pub resources: Vec<McpResource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Json { json: Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(rename = "structuredContent", default)]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError", default)]
    pub is_error: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReadResourceResult {
    #[serde(default)]
    pub contents: Vec<ResourceContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub blob: Option<String>,
}

/// Adapts an MCP `tools/call` result into a plain JSON value: prefer
/// `structuredContent`, else parse a lone text block as JSON (falling back
/// to the raw string), else a lone `json` content block, else the raw
/// content array.
pub fn adapt_call_result(result: &CallToolResult) -> Value {
    if let Some(structured) = &result.structured_content {
        if structured.is_object() {
            return structured.clone();
        }
    }

    if result.content.len() == 1 {
        match &result.content[0] {
            ContentBlock::Text { text } => {
                return serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.clone()));
            }
            ContentBlock::Json { json } => return json.clone(),
            ContentBlock::Other => {}
        }
    }

    serde_json::to_value(&result.content).unwrap_or(Value::Null)
}

/// Adapts a `resources/read` result through the same rules as
/// `adapt_call_result`: a lone text contents entry is parsed as JSON if
/// possible, a lone blob is returned as its raw (base64) string, and
/// anything else falls back to the whole `contents` array.
pub fn adapt_resource_result(result: &ReadResourceResult) -> Value {
    if result.contents.len() == 1 {
        let entry = &result.contents[0];
        if let Some(text) = &entry.text {
            return serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.clone()));
        }
        if let Some(blob) = &entry.blob {
            return Value::String(blob.clone());
        }
    }
    serde_json::to_value(&result.contents).unwrap_or(Value::Null)
}

/// Concatenates every text content block, used to build a `ToolCallError`
/// message when `isError: true`.
pub fn error_message(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|c| match c {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}
