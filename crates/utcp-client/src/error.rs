//! The facade's error type, aggregating every transport/core error via
//! `#[from]` plus the handful of failures that only make sense at the
//! client layer (unknown manuals, malformed config files).

use thiserror::Error;

use utcp_core::UtcpError;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Everything a transport or the core crate can raise — configuration,
    /// variable resolution, tool-not-found, transport, auth, timeout, …
    #[error(transparent)]
    Utcp(#[from] UtcpError),

    #[error("failed to read config file '{path}': {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ConfigParse { path: String, source: String },

    #[error("manual '{name}' is not registered")]
    ManualNotFound { name: String },

    #[error("tool name '{0}' is not qualified with a manual name ('manualName.toolName')")]
    UnqualifiedToolName(String),

    #[error("duplicate tool name '{tool_name}' within manual '{manual}'")]
    DuplicateToolName { manual: String, tool_name: String },
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Utcp(UtcpError::configuration(err.to_string()))
    }
}

impl From<serde_yaml::Error> for ClientError {
    fn from(err: serde_yaml::Error) -> Self {
        ClientError::Utcp(UtcpError::configuration(err.to_string()))
    }
}
