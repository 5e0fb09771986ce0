use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::auth::Auth;

/// HTTP method used by an `http` call template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

/// `file` / `text` call template — a manual backed by a JSON or YAML file on
/// disk, either a native UTCP manual or an OpenAPI document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCallTemplate {
    pub name: String,
    pub file_path: String,
    /// Auth applied to tools derived from an OpenAPI document at this path.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth_tools: Option<Auth>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth: Option<Auth>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub allowed_communication_protocols: Option<Vec<String>>,
}

/// `http` call template — direct HTTP invocation of a single tool. This is
/// both a user-authorable template and the shape the OpenAPI converter
/// synthesizes per operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCallTemplate {
    pub name: String,
    pub url: String,
    pub http_method: HttpMethod,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Name of the input property that should be serialized as the request
    /// body (when absent, all non-path/query/header properties are merged
    /// into a JSON body).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body_field: Option<String>,
    /// Names of input properties that should be sent as headers.
    #[serde(default)]
    pub header_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth: Option<Auth>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub allowed_communication_protocols: Option<Vec<String>>,
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// One configured MCP server within an [`McpCallTemplate`], tagged on
/// `transport`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpServerConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        cwd: Option<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        headers: Option<HashMap<String, String>>,
        #[serde(default = "default_mcp_timeout")]
        timeout: u64,
        #[serde(default = "default_sse_read_timeout")]
        sse_read_timeout: u64,
        #[serde(default = "default_true")]
        terminate_on_close: bool,
    },
}

impl McpServerConfig {
    /// Request timeout in seconds; stdio servers have no network timeout
    /// concept, so callers fall back to the 30s default there too.
    pub fn timeout_secs(&self) -> u64 {
        match self {
            Self::Stdio { .. } => default_mcp_timeout(),
            Self::Http { timeout, .. } => *timeout,
        }
    }
}

fn default_mcp_timeout() -> u64 {
    30
}

fn default_sse_read_timeout() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// `mcp` call template — a manual whose tools are multiplexed across one or
/// more named MCP servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpCallTemplate {
    pub name: String,
    pub config: McpConfig,
    /// OAuth2 auth applied to HTTP servers in this template. Per design
    /// decision (open question a), this does NOT apply to stdio servers.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub register_resources_as_tools: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub allowed_communication_protocols: Option<Vec<String>>,
}

/// Servers are kept in an order-preserving map: registration iterates them
/// in declaration order (stdio subprocesses are spawned in the order their
/// server entries appear), which a plain `HashMap` can't guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: IndexMap<String, McpServerConfig>,
}

/// `direct-call` call template — an in-process callable exposed as a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectCallTemplate {
    pub name: String,
    pub callable_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth: Option<Auth>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub allowed_communication_protocols: Option<Vec<String>>,
}

/// The declarative configuration describing how to reach one manual (and,
/// through it, its tools). Tagged on `call_template_type`; `file` and `text`
/// are accepted as aliases of the same variant since both identify a
/// manual backed by a file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "call_template_type")]
pub enum CallTemplate {
    #[serde(rename = "file", alias = "text")]
    File(FileCallTemplate),
    #[serde(rename = "http")]
    Http(HttpCallTemplate),
    #[serde(rename = "mcp")]
    Mcp(McpCallTemplate),
    #[serde(rename = "direct-call")]
    DirectCall(DirectCallTemplate),
}

impl CallTemplate {
    pub fn name(&self) -> &str {
        match self {
            Self::File(t) => &t.name,
            Self::Http(t) => &t.name,
            Self::Mcp(t) => &t.name,
            Self::DirectCall(t) => &t.name,
        }
    }

    /// The lowercase transport tag used to look up this template's protocol
    /// in the plugin registry.
    pub fn call_template_type(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Http(_) => "http",
            Self::Mcp(_) => "mcp",
            Self::DirectCall(_) => "direct-call",
        }
    }

    pub fn allowed_communication_protocols(&self) -> Option<&[String]> {
        match self {
            Self::File(t) => t.allowed_communication_protocols.as_deref(),
            Self::Http(t) => t.allowed_communication_protocols.as_deref(),
            Self::Mcp(t) => t.allowed_communication_protocols.as_deref(),
            Self::DirectCall(t) => t.allowed_communication_protocols.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_and_text_tags_deserialize_to_the_same_variant() {
        let file: CallTemplate =
            serde_json::from_str(r#"{"name":"m","call_template_type":"file","file_path":"./m.json"}"#)
                .unwrap();
        let text: CallTemplate =
            serde_json::from_str(r#"{"name":"m","call_template_type":"text","file_path":"./m.json"}"#)
                .unwrap();
        assert!(matches!(file, CallTemplate::File(_)));
        assert!(matches!(text, CallTemplate::File(_)));
    }

    #[test]
    fn round_trips_through_json() {
        let original: CallTemplate = serde_json::from_str(
            r#"{"name":"m","call_template_type":"direct-call","callable_name":"my_fn"}"#,
        )
        .unwrap();
        let value = serde_json::to_value(&original).unwrap();
        let roundtripped: CallTemplate = serde_json::from_value(value).unwrap();
        assert_eq!(original.name(), roundtripped.name());
        assert_eq!(
            original.call_template_type(),
            roundtripped.call_template_type()
        );
    }

    #[test]
    fn mcp_server_config_tags_on_transport() {
        let cfg: McpConfig = serde_json::from_str(
            r#"{"mcpServers":{"srv":{"transport":"stdio","command":"echo","args":["hi"]}}}"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.mcp_servers.get("srv").unwrap(),
            McpServerConfig::Stdio { .. }
        ));
    }
}
