//! Shared error vocabulary for the UTCP client runtime.
//!
//! Every transport crate (`utcp-transport-file`, `utcp-transport-http`,
//! `utcp-mcp`, `utcp-direct`) and the facade (`utcp-client`) speak
//! [`UtcpError`] across their public boundaries, even though each crate may
//! also carry a richer, crate-local error type for its own internals (see
//! `utcp-openapi::OpenApiError`). This mirrors a common pattern: one shared
//! error type at the foundation layer with per-crate errors layered on
//! top.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UtcpError>;

/// The kind of transport-level failure that occurred. Connection-class
/// failures (`Connect`, `Read`, `Write`, `Closed`) are what trigger the MCP
/// transport's one-shot auto-recovery retry; `Cancelled` is not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Read,
    Write,
    Cancelled,
    Closed,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
            Self::Cancelled => "cancelled",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl TransportErrorKind {
    /// Connection-class failures are eligible for the MCP transport's
    /// one-shot auto-recovery retry; tool-reported errors and in-flight
    /// request timeouts are not.
    pub fn is_connection_class(&self) -> bool {
        matches!(self, Self::Connect | Self::Read | Self::Write | Self::Closed)
    }
}

/// The single error type every UTCP transport and the client facade return.
#[derive(Debug, Error)]
pub enum UtcpError {
    /// Malformed call template, unknown `call_template_type`, or invalid
    /// OpenAPI-to-tool mapping input.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An unresolved `${NAME}` reference remained after variable
    /// substitution.
    #[error("variable not found: {name}")]
    VariableNotFound { name: String },

    /// `callTool`/`searchTools` referenced a tool that isn't registered.
    #[error("tool not found: {tool_name}")]
    ToolNotFound { tool_name: String },

    /// An MCP-qualified tool name didn't split into at least
    /// `serverName.toolName`.
    #[error("invalid tool name '{tool_name}': {reason}")]
    InvalidToolName { tool_name: String, reason: String },

    /// An MCP-qualified tool name referenced a server absent from the
    /// template's `config.mcpServers`.
    #[error("Configuration for MCP server '{server}' not found in manual '{manual}'")]
    UnknownServer { manual: String, server: String },

    /// A tool invocation failed at the remote end (as opposed to a local
    /// transport/connection failure).
    #[error("tool call '{tool_name}' failed: {message}")]
    ToolCall {
        tool_name: String,
        message: String,
    },

    /// The direct-call transport was asked to invoke a callable name it has
    /// no registration for.
    #[error("unknown callable: {callable_name}")]
    UnknownCallable { callable_name: String },

    /// OAuth2 token acquisition, or another auth handshake step, failed.
    #[error("authentication failed during {stage}: {cause}")]
    Auth { stage: String, cause: String },

    /// Connection-level transport failure.
    #[error("transport {kind} error: {cause}")]
    Transport {
        kind: TransportErrorKind,
        cause: String,
    },

    /// A request exceeded its deadline.
    #[error("{operation} timed out after {limit_ms}ms")]
    Timeout { operation: String, limit_ms: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UtcpError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn transport(kind: TransportErrorKind, cause: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            cause: cause.into(),
        }
    }

    /// Whether this error should trigger the MCP transport's one-shot
    /// auto-recovery retry (true for connection-class failures).
    pub fn is_retryable_connection_error(&self) -> bool {
        matches!(self, Self::Transport { kind, .. } if kind.is_connection_class())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_read_write_closed_are_connection_class() {
        assert!(TransportErrorKind::Connect.is_connection_class());
        assert!(TransportErrorKind::Read.is_connection_class());
        assert!(TransportErrorKind::Write.is_connection_class());
        assert!(TransportErrorKind::Closed.is_connection_class());
    }

    #[test]
    fn cancelled_is_not_connection_class() {
        assert!(!TransportErrorKind::Cancelled.is_connection_class());
    }

    #[test]
    fn transport_error_with_connection_class_kind_is_retryable() {
        let err = UtcpError::transport(TransportErrorKind::Connect, "refused");
        assert!(err.is_retryable_connection_error());

        let err = UtcpError::transport(TransportErrorKind::Cancelled, "cancelled");
        assert!(!err.is_retryable_connection_error());
    }

    #[test]
    fn non_transport_errors_are_never_retryable() {
        let err = UtcpError::ToolNotFound { tool_name: "foo".to_string() };
        assert!(!err.is_retryable_connection_error());

        let err = UtcpError::Timeout { operation: "call_tool".to_string(), limit_ms: 500 };
        assert!(!err.is_retryable_connection_error());
    }

    #[test]
    fn unknown_server_message_matches_wire_format() {
        let err = UtcpError::UnknownServer {
            manual: "m".to_string(),
            server: "s".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Configuration for MCP server 's' not found in manual 'm'"
        );
    }

    #[test]
    fn invalid_tool_name_message_matches_wire_format() {
        let err = UtcpError::InvalidToolName {
            tool_name: "bare".to_string(),
            reason: "missing server prefix".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid tool name 'bare': missing server prefix"
        );
    }
}
