//! The client facade — orchestrates the plugin registry, variable
//! resolver, tool repository, and transports behind
//! `registerManual`/`callTool`/`searchTools`/`close`.
//!
//! Construction is a single explicit async constructor (`Client::new`)
//! taking configuration and wiring the registry bundle in one step, rather
//! than a two-phase construct-then-initialize dance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde_json::Value;
use tracing::{debug, error, warn};

use utcp_core::ClientContext;
use utcp_direct::DirectCallableFn;
use utcp_types::{CallTemplate, RegisterManualResult, Tool};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::registry::PluginRegistry;
use crate::repository::ToolRepository;
use crate::variables::VariableResolver;

/// Default cap on `searchTools` results when the caller doesn't specify a
/// limit.
const DEFAULT_SEARCH_LIMIT: usize = 50;

/// The UTCP client: discovers and invokes tools behind whatever transports
/// its configured manuals declare.
pub struct Client {
    root_dir: PathBuf,
    registry: PluginRegistry,
    resolver: VariableResolver,
    repository: ToolRepository,
    /// The resolved (variable-substituted) `CallTemplate` for each
    /// registered manual, keyed by manual name — what `callTool` and
    /// `deregisterManual` dispatch through.
    templates: RwLock<HashMap<String, CallTemplate>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("root_dir", &self.root_dir)
            .field("manuals", &self.templates.read().unwrap().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Client {
    /// Constructs a client rooted at `root_dir`, wiring the baseline
    /// transports and materializing every configured variable loader and
    /// manual call template.
    pub async fn new(root_dir: impl Into<PathBuf>, config: ClientConfig) -> Result<Self> {
        let root_dir = root_dir.into();

        let mut registry = PluginRegistry::new();
        registry.ensure_core_plugins_initialized();

        let mut loaders = Vec::with_capacity(config.load_variables_from.len());
        for loader_config in &config.load_variables_from {
            let (type_id, raw) = loader_config.type_id_and_raw();
            loaders.push(registry.build_variable_loader(type_id, &root_dir, &raw)?);
        }
        let resolver = VariableResolver::new(config.variables.clone(), loaders);

        let client = Self {
            root_dir,
            registry,
            resolver,
            repository: ToolRepository::new(),
            templates: RwLock::new(HashMap::new()),
        };

        for raw_template in &config.manual_call_templates {
            let result = client.register_manual(raw_template.clone()).await?;
            if !result.success {
                warn!(manual = %result.manual.name, errors = ?result.errors, "manual registration reported errors at startup");
            }
        }

        Ok(client)
    }

    /// A client with no manuals configured, rooted at `root_dir` — useful
    /// for embedders that register manuals programmatically via
    /// [`Self::register_manual`] rather than a config file.
    pub async fn empty(root_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(root_dir, ClientConfig::empty()).await
    }

    /// Register an in-process callable with the direct-call transport.
    /// May be called before or after any manual referencing it is
    /// registered — see `utcp-direct`'s pending-registration buffer.
    pub fn register_callable(&self, name: impl Into<String>, param_order: Vec<String>, func: DirectCallableFn) {
        self.registry.direct_transport().register_callable(name, param_order, func);
    }

    /// Registers a manual from a raw, not-yet-typed call template (as read
    /// from a config file or supplied programmatically). Variable
    /// substitution and transport dispatch happen here; a malformed
    /// template (missing `name`/`call_template_type`, unknown transport
    /// type, unresolved `${...}`) is thrown — everything else the
    /// transport itself encounters is captured in the returned result.
    pub async fn register_manual(&self, raw_template: Value) -> Result<RegisterManualResult> {
        let manual_name = raw_template
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::from(utcp_core::UtcpError::configuration("call template missing 'name'")))?
            .to_string();
        let call_template_type = raw_template
            .get("call_template_type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ClientError::from(utcp_core::UtcpError::configuration(
                    "call template missing 'call_template_type'",
                ))
            })?
            .to_string();

        let resolved = self.resolver.resolve(&manual_name, &raw_template)?;
        let template: CallTemplate = serde_json::from_value(resolved).map_err(|e| {
            ClientError::from(utcp_core::UtcpError::configuration(format!("invalid call template: {e}")))
        })?;

        let protocol = self.registry.protocol_for(&call_template_type).ok_or_else(|| {
            ClientError::from(utcp_core::UtcpError::configuration(format!(
                "unknown call_template_type: {call_template_type}"
            )))
        })?;

        let ctx = ClientContext::new(self.root_dir.clone());
        debug!(manual = %manual_name, transport = %call_template_type, "registering manual");
        let result = protocol.register_manual(&ctx, &template).await;

        if result.success {
            self.repository.save_manual(manual_name.clone(), result.manual.clone())?;
            self.templates.write().unwrap().insert(manual_name, template);
        } else {
            error!(manual = %manual_name, errors = ?result.errors, "manual registration failed");
        }

        Ok(result)
    }

    /// Deregisters a manual: releases the owning transport's long-lived
    /// resources for it, then removes it (and all its tools) from the
    /// repository.
    pub async fn deregister_manual(&self, name: &str) -> Result<()> {
        let template = self
            .templates
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::ManualNotFound { name: name.to_string() })?;

        let protocol = self
            .registry
            .protocol_for(template.call_template_type())
            .expect("template type was validated at registration time");

        let ctx = ClientContext::new(self.root_dir.clone());
        protocol.deregister_manual(&ctx, &template).await?;

        self.repository.remove_manual(name);
        self.templates.write().unwrap().remove(name);
        Ok(())
    }

    fn owning_template(&self, qualified_name: &str) -> Result<(CallTemplate, String)> {
        let (manual_name, local_name) = qualified_name.split_once('.').ok_or_else(|| {
            ClientError::UnqualifiedToolName(qualified_name.to_string())
        })?;
        let template = self
            .templates
            .read()
            .unwrap()
            .get(manual_name)
            .cloned()
            .ok_or_else(|| ClientError::ManualNotFound { name: manual_name.to_string() })?;
        Ok((template, local_name.to_string()))
    }

    /// Invokes `qualifiedName` (`manualName.toolName`, possibly with
    /// further dots the owning transport interprets itself — e.g. MCP's
    /// `server.tool`). Splits on the *first* dot to find the owning manual,
    /// then delegates to that manual's transport with the local name.
    pub async fn call_tool(&self, qualified_name: &str, args: Value) -> Result<Value> {
        let (template, local_name) = self.owning_template(qualified_name)?;
        let protocol = self
            .registry
            .protocol_for(template.call_template_type())
            .expect("template type was validated at registration time");
        let ctx = ClientContext::new(self.root_dir.clone());
        protocol
            .call_tool(&ctx, &local_name, args, &template)
            .await
            .map_err(ClientError::from)
    }

    /// Streaming counterpart of [`Self::call_tool`].
    pub async fn call_tool_streaming(
        &self,
        qualified_name: &str,
        args: Value,
    ) -> Result<utcp_core::ToolCallStream> {
        let (template, local_name) = self.owning_template(qualified_name)?;
        let protocol = self
            .registry
            .protocol_for(template.call_template_type())
            .expect("template type was validated at registration time");
        let ctx = ClientContext::new(self.root_dir.clone());
        protocol
            .call_tool_streaming(&ctx, &local_name, args, &template)
            .await
            .map_err(ClientError::from)
    }

    /// Never suspends — delegates straight to the in-memory repository.
    pub fn search_tools(&self, query: &str, limit: Option<usize>) -> Vec<Tool> {
        self.repository.search_tools(query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
    }

    pub fn get_tool(&self, name: &str) -> Option<Tool> {
        self.repository.get_tool(name)
    }

    pub fn get_tools(&self) -> Vec<Tool> {
        self.repository.get_tools()
    }

    /// Closes every loaded transport and clears the repository. The client
    /// is not usable afterwards.
    pub async fn close(&self) -> Result<()> {
        self.registry.close_all().await?;
        self.repository.clear();
        self.templates.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn echo_callable() -> DirectCallableFn {
        Arc::new(|args: Vec<Value>| {
            Box::pin(async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) })
        })
    }

    #[tokio::test]
    async fn registers_native_manual_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("m.json"),
            r#"{"utcp_version":"1.0.1","manual_version":"1.0.0","tools":[{"name":"m.echo","description":"","tool_call_template":{"name":"m","call_template_type":"file","file_path":"./m.json"}}]}"#,
        )
        .unwrap();

        let client = Client::empty(dir.path()).await.unwrap();
        let result = client
            .register_manual(serde_json::json!({
                "name": "m",
                "call_template_type": "file",
                "file_path": "m.json"
            }))
            .await
            .unwrap();

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(client.get_tools().len(), 1);
        assert_eq!(client.get_tool("m.echo").unwrap().name, "m.echo");
    }

    #[tokio::test]
    async fn openapi_yaml_registers_one_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("petstore.yaml"),
            "openapi: \"3.0.0\"\ninfo:\n  title: t\n  version: \"1\"\npaths:\n  /test:\n    get:\n      operationId: getTest\n      responses:\n        \"200\":\n          description: OK\n",
        )
        .unwrap();

        let client = Client::empty(dir.path()).await.unwrap();
        let result = client
            .register_manual(serde_json::json!({
                "name": "petstore",
                "call_template_type": "file",
                "file_path": "petstore.yaml"
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(client.get_tools().iter().any(|t| t.name.contains("getTest")));
    }

    #[tokio::test]
    async fn direct_call_round_trip() {
        let client = Client::empty(".").await.unwrap();
        client.register_callable("echo", vec!["message".to_string()], echo_callable());

        let result = client
            .register_manual(serde_json::json!({
                "name": "m",
                "call_template_type": "direct-call",
                "callable_name": "echo"
            }))
            .await
            .unwrap();
        assert!(result.success);

        let value = client
            .call_tool("m.m", serde_json::json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn unqualified_tool_name_is_an_error() {
        let client = Client::empty(".").await.unwrap();
        let err = client.call_tool("nodot", Value::Null).await.unwrap_err();
        assert!(matches!(err, ClientError::UnqualifiedToolName(_)));
    }

    #[tokio::test]
    async fn call_tool_on_unregistered_manual_is_manual_not_found() {
        let client = Client::empty(".").await.unwrap();
        let err = client.call_tool("ghost.tool", Value::Null).await.unwrap_err();
        assert!(matches!(err, ClientError::ManualNotFound { .. }));
    }

    #[tokio::test]
    async fn deregister_then_reregister_recovers_the_same_tool_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("m.json"),
            r#"{"utcp_version":"1.0.1","manual_version":"1.0.0","tools":[{"name":"m.echo","description":"","tool_call_template":{"name":"m","call_template_type":"file","file_path":"./m.json"}}]}"#,
        )
        .unwrap();
        let client = Client::empty(dir.path()).await.unwrap();
        let template = serde_json::json!({"name": "m", "call_template_type": "file", "file_path": "m.json"});

        client.register_manual(template.clone()).await.unwrap();
        let before: Vec<String> = client.get_tools().into_iter().map(|t| t.name).collect();

        client.deregister_manual("m").await.unwrap();
        assert!(client.get_tools().is_empty());

        client.register_manual(template).await.unwrap();
        let after: Vec<String> = client.get_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn close_clears_the_repository() {
        let client = Client::empty(".").await.unwrap();
        client.register_callable("echo", vec!["message".to_string()], echo_callable());
        client
            .register_manual(serde_json::json!({"name": "m", "call_template_type": "direct-call", "callable_name": "echo"}))
            .await
            .unwrap();
        assert!(!client.get_tools().is_empty());
        client.close().await.unwrap();
        assert!(client.get_tools().is_empty());
    }
}
