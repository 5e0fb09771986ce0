//! MCP `CommunicationProtocol` — the hard part.
//!
//! Multiplexes a manual whose template declares N named MCP servers, each
//! with its own lazily-established, auto-recovering [`session::Session`].
//! Tool calls route to the right session via the fully qualified name
//! `<manual>.<server>.<tool>`; the client facade strips `<manual>.` before
//! calling [`McpTransport::call_tool`], so this transport only ever sees
//! `<server>.<tool>`.

mod dereference;
mod oauth;
mod protocol;
mod session;

pub use dereference::dereference;
pub use protocol::{adapt_call_result, adapt_resource_result, error_message};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, warn};

use utcp_core::{ClientContext, CommunicationProtocol, Result, ToolCallStream, UtcpError};
use utcp_types::{
    Auth, CallTemplate, JsonSchema, Manual, McpCallTemplate, McpServerConfig, RegisterManualResult, Tool,
};

use crate::oauth::TokenCache;
use crate::protocol::{CallToolResult, ListResourcesResult, ListToolsResult, ReadResourceResult};
use crate::session::Session;

/// `(manual, server)` — the key every session and resource-URI entry is
/// filed under.
type SessionKey = (String, String);
/// `(manual, server, local_tool_name)` — resources registered as tools are
/// looked up by this key in [`McpTransport::call_tool`] to distinguish a
/// `resources/read` dispatch from an ordinary `tools/call`.
type ResourceKey = (String, String, String);

/// One of the handful of JSON-RPC operations the multiplexer performs,
/// bundled so a single retry helper (`with_recovery`) can wrap all of them
/// instead of repeating the lock/connect/retry dance per call site.
enum McpOp<'a> {
    ListTools,
    ListResources,
    CallTool { name: &'a str, arguments: Value },
    ReadResource { uri: &'a str },
}

enum McpOpResult {
    Tools(ListToolsResult),
    Resources(ListResourcesResult),
    Call(CallToolResult),
    Resource(ReadResourceResult),
}

async fn run_op(session: &Session, op: &McpOp<'_>, timeout_ms: u64) -> Result<McpOpResult> {
    match op {
        McpOp::ListTools => session.list_tools(timeout_ms).await.map(McpOpResult::Tools),
        McpOp::ListResources => session.list_resources(timeout_ms).await.map(McpOpResult::Resources),
        McpOp::CallTool { name, arguments } => {
            session.call_tool(name, arguments.clone(), timeout_ms).await.map(McpOpResult::Call)
        }
        McpOp::ReadResource { uri } => session.read_resource(uri, timeout_ms).await.map(McpOpResult::Resource),
    }
}

/// Multi-server MCP multiplexer. One instance is shared (as a singleton)
/// across every manual registered through the `mcp` call template; sessions
/// and the OAuth2 token cache are keyed so concurrent manuals don't collide.
pub struct McpTransport {
    sessions: AsyncMutex<HashMap<SessionKey, Arc<AsyncMutex<Option<Session>>>>>,
    resource_uris: AsyncMutex<HashMap<ResourceKey, String>>,
    token_cache: TokenCache,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for McpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTransport").finish_non_exhaustive()
    }
}

impl Default for McpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl McpTransport {
    pub fn new() -> Self {
        Self {
            sessions: AsyncMutex::new(HashMap::new()),
            resource_uris: AsyncMutex::new(HashMap::new()),
            token_cache: TokenCache::default(),
            http_client: reqwest::Client::new(),
        }
    }

    async fn session_slot(&self, key: SessionKey) -> Arc<AsyncMutex<Option<Session>>> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(None))).clone()
    }

    /// The outer `auth` on an `McpCallTemplate` only applies to HTTP
    /// servers (see DESIGN.md): stdio servers never see a bearer token.
    async fn bearer_token(&self, server_config: &McpServerConfig, tmpl: &McpCallTemplate) -> Result<Option<String>> {
        if !matches!(server_config, McpServerConfig::Http { .. }) {
            return Ok(None);
        }
        match &tmpl.auth {
            Some(Auth::OAuth2 { token_url, client_id, client_secret, scope }) => {
                let token = self
                    .token_cache
                    .get_or_fetch(&self.http_client, token_url, client_id, client_secret, scope.as_deref())
                    .await?;
                Ok(Some(token))
            }
            _ => Ok(None),
        }
    }

    /// Obtains (lazily creating) the session for `(manual, server)`, runs
    /// `op`, and on a connection-class failure discards the session,
    /// recreates it, and replays `op` exactly once. A second failure
    /// propagates.
    async fn with_recovery(
        &self,
        manual: &str,
        server_name: &str,
        server_config: &McpServerConfig,
        bearer: Option<String>,
        op: McpOp<'_>,
        timeout_ms: u64,
    ) -> Result<McpOpResult> {
        let slot = self.session_slot((manual.to_string(), server_name.to_string())).await;
        let mut guard = slot.lock().await;

        if guard.is_none() {
            *guard = Some(Session::connect(server_name, server_config, bearer.as_deref()).await?);
        }

        let first = run_op(guard.as_ref().expect("just established"), &op, timeout_ms).await;
        match first {
            Ok(v) => Ok(v),
            Err(e) if e.is_retryable_connection_error() => {
                warn!(manual, server = server_name, error = %e, "MCP session failed, recreating and retrying once");
                *guard = None;
                let fresh = Session::connect(server_name, server_config, bearer.as_deref()).await?;
                let second = run_op(&fresh, &op, timeout_ms).await;
                *guard = Some(fresh);
                second
            }
            Err(e) => Err(e),
        }
    }

    async fn discover_server(
        &self,
        manual: &str,
        server_name: &str,
        server_config: &McpServerConfig,
        tmpl: &McpCallTemplate,
    ) -> Result<Vec<Tool>> {
        let bearer = self.bearer_token(server_config, tmpl).await?;
        let timeout_ms = server_config.timeout_secs() * 1000;

        let listed = match self
            .with_recovery(manual, server_name, server_config, bearer.clone(), McpOp::ListTools, timeout_ms)
            .await?
        {
            McpOpResult::Tools(listed) => listed,
            _ => unreachable!("ListTools op always yields McpOpResult::Tools"),
        };

        let mut tools = Vec::with_capacity(listed.tools.len());
        for t in listed.tools {
            let inputs = JsonSchema(dereference::dereference(&t.input_schema));
            let outputs = t
                .output_schema
                .as_ref()
                .map(|s| JsonSchema(dereference::dereference(s)))
                .unwrap_or_else(JsonSchema::empty);
            tools.push(Tool {
                name: format!("{manual}.{server_name}.{}", t.name),
                description: t.description.unwrap_or_default(),
                tags: Default::default(),
                inputs,
                outputs,
                tool_call_template: CallTemplate::Mcp(tmpl.clone()),
            });
        }

        if tmpl.register_resources_as_tools {
            match self
                .with_recovery(manual, server_name, server_config, bearer, McpOp::ListResources, timeout_ms)
                .await
            {
                Ok(McpOpResult::Resources(listed)) => {
                    let mut uris = self.resource_uris.lock().await;
                    for r in listed.resources {
                        uris.insert((manual.to_string(), server_name.to_string(), r.name.clone()), r.uri.clone());
                        tools.push(Tool {
                            name: format!("{manual}.{server_name}.{}", r.name),
                            description: r.description.clone().unwrap_or_default(),
                            tags: Default::default(),
                            inputs: JsonSchema::empty(),
                            outputs: JsonSchema::empty(),
                            tool_call_template: CallTemplate::Mcp(tmpl.clone()),
                        });
                    }
                }
                Ok(_) => unreachable!("ListResources op always yields McpOpResult::Resources"),
                Err(e) => {
                    // Provisional per Open Question (b): resource listing is
                    // best-effort, a server that can't list resources still
                    // contributes its tools.
                    warn!(manual, server = server_name, error = %e, "resources/list failed, continuing with tools only");
                }
            }
        }

        Ok(tools)
    }
}

#[async_trait]
impl CommunicationProtocol for McpTransport {
    async fn register_manual(
        &self,
        _client: &ClientContext,
        template: &CallTemplate,
    ) -> RegisterManualResult {
        let CallTemplate::Mcp(tmpl) = template else {
            return RegisterManualResult::failure(
                template.clone(),
                vec!["mcp transport received a non-mcp call template".to_string()],
            );
        };

        let mut tools = Vec::new();
        let mut errors = Vec::new();

        // Servers are iterated in the order they were declared, so stdio
        // subprocesses spawn in declared order (`McpConfig` uses an
        // order-preserving map for exactly this reason).
        for (server_name, server_config) in &tmpl.config.mcp_servers {
            match self.discover_server(&tmpl.name, server_name, server_config, tmpl).await {
                Ok(mut discovered) => tools.append(&mut discovered),
                Err(e) => {
                    error!(manual = %tmpl.name, server = %server_name, error = %e, "MCP server registration failed");
                    errors.push(format!("server '{server_name}': {e}"));
                }
            }
        }

        // success is true iff at least one server produced tools AND no
        // server errored — a partial failure fails the whole registration,
        // even though some servers may have discovered tools.
        if !errors.is_empty() {
            return RegisterManualResult::failure(template.clone(), errors);
        }
        if tools.is_empty() {
            return RegisterManualResult::failure(
                template.clone(),
                vec!["no MCP servers produced any tools".to_string()],
            );
        }

        let manual = Manual {
            name: tmpl.name.clone(),
            utcp_version: utcp_types::UTCP_VERSION.to_string(),
            manual_version: "1.0.0".to_string(),
            tools,
        };
        RegisterManualResult::success(template.clone(), manual)
    }

    async fn deregister_manual(&self, _client: &ClientContext, template: &CallTemplate) -> Result<()> {
        let CallTemplate::Mcp(tmpl) = template else {
            return Ok(());
        };
        let manual = &tmpl.name;

        let mut sessions = self.sessions.lock().await;
        let keys: Vec<SessionKey> = sessions.keys().filter(|(m, _)| m == manual).cloned().collect();
        for key in keys {
            if let Some(slot) = sessions.remove(&key) {
                let mut guard = slot.lock().await;
                if let Some(session) = guard.take() {
                    let _ = session.close().await;
                }
            }
        }
        drop(sessions);

        let mut uris = self.resource_uris.lock().await;
        uris.retain(|(m, _, _), _| m != manual);
        Ok(())
    }

    async fn call_tool(
        &self,
        _client: &ClientContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> Result<Value> {
        let CallTemplate::Mcp(tmpl) = template else {
            return Err(UtcpError::configuration("mcp transport received a non-mcp call template"));
        };
        let manual = &tmpl.name;

        let Some(dot) = tool_name.find('.') else {
            return Err(UtcpError::InvalidToolName {
                tool_name: tool_name.to_string(),
                reason: "Expected 'manualName.serverName.toolName'".to_string(),
            });
        };
        let server_name = &tool_name[..dot];
        let local_tool = &tool_name[dot + 1..];

        let Some(server_config) = tmpl.config.mcp_servers.get(server_name) else {
            return Err(UtcpError::UnknownServer {
                manual: manual.clone(),
                server: server_name.to_string(),
            });
        };

        let bearer = self.bearer_token(server_config, tmpl).await?;
        let timeout_ms = server_config.timeout_secs() * 1000;

        let resource_uri = {
            let uris = self.resource_uris.lock().await;
            uris.get(&(manual.clone(), server_name.to_string(), local_tool.to_string())).cloned()
        };

        if let Some(uri) = resource_uri {
            let result = self
                .with_recovery(manual, server_name, server_config, bearer, McpOp::ReadResource { uri: &uri }, timeout_ms)
                .await?;
            let McpOpResult::Resource(resource) = result else {
                unreachable!("ReadResource op always yields McpOpResult::Resource");
            };
            return Ok(adapt_resource_result(&resource));
        }

        let result = self
            .with_recovery(
                manual,
                server_name,
                server_config,
                bearer,
                McpOp::CallTool { name: local_tool, arguments: args },
                timeout_ms,
            )
            .await?;
        let McpOpResult::Call(call_result) = result else {
            unreachable!("CallTool op always yields McpOpResult::Call");
        };

        if call_result.is_error == Some(true) {
            return Err(UtcpError::ToolCall {
                tool_name: tool_name.to_string(),
                message: error_message(&call_result),
            });
        }
        Ok(adapt_call_result(&call_result))
    }

    async fn call_tool_streaming(
        &self,
        client: &ClientContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> Result<ToolCallStream> {
        let result = self.call_tool(client, tool_name, args, template).await;
        Ok(Box::pin(futures::stream::once(async move { result })))
    }

    async fn close(&self) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        for (_, slot) in sessions.drain() {
            let mut guard = slot.lock().await;
            if let Some(session) = guard.take() {
                let _ = session.close().await;
            }
        }
        drop(sessions);
        self.resource_uris.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utcp_types::{FileCallTemplate, McpConfig};

    fn ctx() -> ClientContext {
        ClientContext::new(".")
    }

    #[tokio::test]
    async fn register_manual_rejects_wrong_template_type() {
        let transport = McpTransport::new();
        let tmpl = CallTemplate::File(FileCallTemplate {
            name: "m".to_string(),
            file_path: "x.json".to_string(),
            auth_tools: None,
            auth: None,
            allowed_communication_protocols: None,
        });
        let result = transport.register_manual(&ctx(), &tmpl).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn call_tool_with_no_dot_is_invalid_tool_name() {
        let transport = McpTransport::new();
        let tmpl = CallTemplate::Mcp(McpCallTemplate {
            name: "m".to_string(),
            config: McpConfig { mcp_servers: Default::default() },
            auth: None,
            register_resources_as_tools: false,
            allowed_communication_protocols: None,
        });
        let err = transport.call_tool(&ctx(), "nonexistent_tool", Value::Null, &tmpl).await.unwrap_err();
        match err {
            UtcpError::InvalidToolName { reason, .. } => {
                assert!(reason.contains("Expected 'manualName.serverName.toolName'"));
            }
            other => panic!("expected InvalidToolName, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_tool_with_unknown_server_is_unknown_server_error() {
        let transport = McpTransport::new();
        let tmpl = CallTemplate::Mcp(McpCallTemplate {
            name: "m".to_string(),
            config: McpConfig { mcp_servers: Default::default() },
            auth: None,
            register_resources_as_tools: false,
            allowed_communication_protocols: None,
        });
        let err = transport
            .call_tool(&ctx(), "unknown_server.any", Value::Null, &tmpl)
            .await
            .unwrap_err();
        match &err {
            UtcpError::UnknownServer { server, .. } => assert_eq!(server, "unknown_server"),
            other => panic!("expected UnknownServer, got {other:?}"),
        }
        assert!(err.to_string().contains("Configuration for MCP server 'unknown_server' not found"));
    }

    #[tokio::test]
    async fn deregister_on_template_with_no_sessions_is_a_noop() {
        let transport = McpTransport::new();
        let tmpl = CallTemplate::Mcp(McpCallTemplate {
            name: "m".to_string(),
            config: McpConfig { mcp_servers: Default::default() },
            auth: None,
            register_resources_as_tools: false,
            allowed_communication_protocols: None,
        });
        transport.deregister_manual(&ctx(), &tmpl).await.unwrap();
    }
}
