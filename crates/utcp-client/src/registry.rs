//! Plugin registry.
//!
//! Binds transport identifiers to `CommunicationProtocol` singletons, plus
//! variable-loader identifiers to loader factories, as two independent
//! name-keyed maps. Registration is idempotent unless
//! `override_existing=true`; a duplicate registration without override is
//! an error.
//!
//! `ensure_core_plugins_initialized` wires the baseline transports per
//! `Client` rather than through a process-wide, `std::sync::Once`-guarded
//! global singleton: each `Client` owns a private `PluginRegistry`, so the
//! registry's lifetime matches the client's rather than the process's.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use utcp_core::{CommunicationProtocol, Result as CoreResult, UtcpError};
use utcp_direct::DirectTransport;
use utcp_mcp::McpTransport;
use utcp_transport_file::FileTransport;
use utcp_transport_http::HttpTransport;

use crate::variables::{DotEnvLoader, VariableLoader};

/// A factory that builds a [`VariableLoader`] from its raw config value
/// (e.g. `{"type": "dotenv", "env_file_path": "..."}"`), given the client's
/// root directory for resolving relative paths.
pub type VariableLoaderFactory = Arc<dyn Fn(&Path, &Value) -> CoreResult<Box<dyn VariableLoader>> + Send + Sync>;

/// Process-scoped-in-spirit, but owned per `Client` in this implementation
/// (see module docs).
pub struct PluginRegistry {
    protocols: HashMap<String, Arc<dyn CommunicationProtocol>>,
    variable_loader_factories: HashMap<String, VariableLoaderFactory>,
    direct: Arc<DirectTransport>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("protocols", &self.protocols.keys().collect::<Vec<_>>())
            .field("variable_loader_factories", &self.variable_loader_factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// An empty registry with no plugins — call
    /// [`Self::ensure_core_plugins_initialized`] to populate the baseline
    /// four transports and the `dotenv` loader factory.
    pub fn new() -> Self {
        Self {
            protocols: HashMap::new(),
            variable_loader_factories: HashMap::new(),
            direct: Arc::new(DirectTransport::new()),
        }
    }

    /// Registers `protocol` under `type_id` (lowercased). Idempotent unless
    /// `override_existing` is set; a duplicate registration without
    /// override is a configuration error.
    pub fn register_protocol(
        &mut self,
        type_id: impl Into<String>,
        protocol: Arc<dyn CommunicationProtocol>,
        override_existing: bool,
    ) -> CoreResult<()> {
        let type_id = type_id.into().to_ascii_lowercase();
        if self.protocols.contains_key(&type_id) && !override_existing {
            return Err(UtcpError::configuration(format!(
                "transport '{type_id}' is already registered"
            )));
        }
        debug!(transport = %type_id, "registering communication protocol");
        self.protocols.insert(type_id, protocol);
        Ok(())
    }

    pub fn register_variable_loader_factory(
        &mut self,
        type_id: impl Into<String>,
        factory: VariableLoaderFactory,
        override_existing: bool,
    ) -> CoreResult<()> {
        let type_id = type_id.into().to_ascii_lowercase();
        if self.variable_loader_factories.contains_key(&type_id) && !override_existing {
            return Err(UtcpError::configuration(format!(
                "variable loader '{type_id}' is already registered"
            )));
        }
        self.variable_loader_factories.insert(type_id, factory);
        Ok(())
    }

    /// Idempotently seeds the four baseline transports (`file`/`text`,
    /// `http`, `mcp`, `direct-call`) and the `dotenv` variable-loader
    /// factory. Safe to call repeatedly — later calls are no-ops for
    /// already-registered ids.
    pub fn ensure_core_plugins_initialized(&mut self) {
        let _ = self.register_protocol("file", Arc::new(FileTransport::new()), false);
        let _ = self.register_protocol("text", Arc::new(FileTransport::new()), false);
        let _ = self.register_protocol("http", Arc::new(HttpTransport::new()), false);
        let _ = self.register_protocol("mcp", Arc::new(McpTransport::new()), false);
        let _ = self.register_protocol("direct-call", self.direct.clone() as Arc<dyn CommunicationProtocol>, false);
        self.direct.activate();

        let _ = self.register_variable_loader_factory(
            "dotenv",
            Arc::new(|root_dir, raw| {
                let path = raw
                    .get("env_file_path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| UtcpError::configuration("dotenv loader requires 'env_file_path'"))?;
                let resolved = crate::variables::resolve_against(root_dir, path);
                Ok(Box::new(DotEnvLoader::new(resolved)) as Box<dyn VariableLoader>)
            }),
            false,
        );
    }

    pub fn protocol_for(&self, type_id: &str) -> Option<Arc<dyn CommunicationProtocol>> {
        self.protocols.get(&type_id.to_ascii_lowercase()).cloned()
    }

    /// The direct-call transport's concrete type, so embedders can
    /// register in-process callables (`Client::register_callable`
    /// delegates here).
    pub fn direct_transport(&self) -> Arc<DirectTransport> {
        self.direct.clone()
    }

    pub fn build_variable_loader(
        &self,
        type_id: &str,
        root_dir: &Path,
        raw: &Value,
    ) -> CoreResult<Box<dyn VariableLoader>> {
        let factory = self
            .variable_loader_factories
            .get(&type_id.to_ascii_lowercase())
            .ok_or_else(|| UtcpError::configuration(format!("unknown variable loader type: {type_id}")))?;
        factory(root_dir, raw)
    }

    /// Closes every registered transport singleton, releasing whatever
    /// long-lived resources it owns across every manual that used it.
    pub async fn close_all(&self) -> CoreResult<()> {
        for (type_id, protocol) in &self.protocols {
            if let Err(e) = protocol.close().await {
                warn!(transport = %type_id, error = %e, "transport close failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_core_plugins_initialized_is_idempotent() {
        let mut registry = PluginRegistry::new();
        registry.ensure_core_plugins_initialized();
        registry.ensure_core_plugins_initialized();
        assert!(registry.protocol_for("file").is_some());
        assert!(registry.protocol_for("http").is_some());
        assert!(registry.protocol_for("mcp").is_some());
        assert!(registry.protocol_for("direct-call").is_some());
        assert!(registry.protocol_for("text").is_some());
    }

    #[test]
    fn duplicate_registration_without_override_is_an_error() {
        let mut registry = PluginRegistry::new();
        registry.ensure_core_plugins_initialized();
        let err = registry
            .register_protocol("http", Arc::new(HttpTransport::new()), false)
            .unwrap_err();
        assert!(matches!(err, UtcpError::Configuration(_)));
    }

    #[test]
    fn override_replaces_an_existing_registration() {
        let mut registry = PluginRegistry::new();
        registry.ensure_core_plugins_initialized();
        registry
            .register_protocol("http", Arc::new(HttpTransport::new()), true)
            .expect("override should succeed");
    }

    #[test]
    fn unregistered_transport_type_yields_none() {
        let registry = PluginRegistry::new();
        assert!(registry.protocol_for("carrier-pigeon").is_none());
    }
}
