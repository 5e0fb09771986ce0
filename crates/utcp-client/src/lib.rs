//! The UTCP client facade: a single entry point that owns the plugin
//! registry, variable resolver, in-memory tool repository, and every
//! configured manual's resolved call template.
//!
//! ```no_run
//! # async fn run() -> utcp_client::Result<()> {
//! use utcp_client::{Client, ClientConfig};
//!
//! let config = ClientConfig::load_from_file("providers.json".as_ref())?;
//! let client = Client::new(".", config).await?;
//!
//! let results = client.search_tools("weather", Some(5));
//! for tool in results {
//!     println!("{}", tool.name);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod registry;
mod repository;
mod variables;

pub use client::Client;
pub use config::{ClientConfig, VariableLoaderConfig};
pub use error::{ClientError, Result};
pub use registry::{PluginRegistry, VariableLoaderFactory};
pub use repository::ToolRepository;
pub use variables::{namespace_safe, DotEnvLoader, VariableLoader, VariableResolver};

pub use utcp_core::{ClientContext, CommunicationProtocol, ToolCallStream, UtcpError};
pub use utcp_direct::DirectCallableFn;
pub use utcp_types::{
    ApiKeyLocation, Auth, CallTemplate, DirectCallTemplate, FileCallTemplate, HttpCallTemplate, HttpMethod,
    JsonSchema, Manual, McpCallTemplate, McpConfig, McpServerConfig, RegisterManualResult, Tool,
};
