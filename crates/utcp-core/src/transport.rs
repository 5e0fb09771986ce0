//! The transport contract every `CommunicationProtocol` implements.
//!
//! This lives in `utcp-core` rather than the client facade crate so that
//! `utcp-transport-file`, `utcp-transport-http`, `utcp-mcp`, and
//! `utcp-direct` can all implement it without depending on `utcp-client` —
//! `utcp-client` is the crate that depends on *them*, assembling the plugin
//! registry, variable resolver, and tool repository around these
//! implementations. See `DESIGN.md` for the full rationale.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use utcp_types::{CallTemplate, RegisterManualResult};

use crate::error::Result;

/// A lazily-produced sequence of result chunks from `call_tool_streaming`.
pub type ToolCallStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// Ambient information a transport needs that isn't carried on the call
/// template itself — currently just the directory relative file paths
/// resolve against.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub root_dir: PathBuf,
}

impl ClientContext {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }
}

/// The polymorphic interface every protocol implementation (file, http, mcp,
/// direct-call, or a user-extended transport) speaks. One singleton instance
/// per transport type is shared across every manual that uses it.
#[async_trait]
pub trait CommunicationProtocol: Send + Sync + std::fmt::Debug {
    /// Enumerate the tools reachable through `template`, doing whatever I/O
    /// is needed (file read, HTTP fetch, MCP handshake). Errors are captured
    /// in the returned result's `errors` field, never propagated as `Err`,
    /// except when the template itself is malformed.
    async fn register_manual(
        &self,
        client: &ClientContext,
        template: &CallTemplate,
    ) -> RegisterManualResult;

    /// Release any long-lived resources tied to this manual (sessions,
    /// subprocesses, cached tokens). Must be idempotent.
    async fn deregister_manual(&self, client: &ClientContext, template: &CallTemplate) -> Result<()>;

    /// Invoke a single tool. `tool_name` is the *local* name — everything
    /// after the manual's name and its separating dot has already been
    /// stripped by the client facade.
    async fn call_tool(
        &self,
        client: &ClientContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> Result<Value>;

    /// Streaming counterpart of `call_tool`. The default implementation
    /// yields the single result of `call_tool` as one chunk, matching the
    /// "yield chunks until exhaustion" non-goal baseline.
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

    /// Release every resource this protocol instance owns, across every
    /// client/manual that has used it.
    async fn close(&self) -> Result<()>;
}
