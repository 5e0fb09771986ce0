//! Foundation crate shared by every UTCP transport and the client facade.
//!
//! Carries the error vocabulary ([`UtcpError`]) and the transport contract
//! ([`CommunicationProtocol`]) that `utcp-transport-file`,
//! `utcp-transport-http`, `utcp-mcp`, and `utcp-direct` all implement.
//! `utcp-client` depends on this crate and on each transport crate to
//! assemble the plugin registry, variable resolver, and tool repository —
//! keeping the dependency graph acyclic.

mod error;
mod oauth2_client;
mod transport;

pub use error::{Result, TransportErrorKind, UtcpError};
pub use oauth2_client::{fetch_client_credentials_token, TokenInfo};
pub use transport::{ClientContext, CommunicationProtocol, ToolCallStream};
