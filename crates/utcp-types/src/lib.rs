//! Core value types shared by every UTCP crate.
//!
//! This crate defines the UTCP data model: [`Tool`], [`Manual`], the
//! polymorphic [`CallTemplate`], [`Auth`], and [`RegisterManualResult`]. It
//! has no transport- or protocol-specific logic; that lives in
//! `utcp-client` and the individual transport crates.

mod auth;
mod call_template;
mod manual;
mod register_result;
mod schema;
mod tool;

pub use auth::{ApiKeyLocation, Auth};
pub use call_template::{
    CallTemplate, DirectCallTemplate, FileCallTemplate, HttpCallTemplate, HttpMethod, McpCallTemplate,
    McpConfig, McpServerConfig,
};
pub use manual::Manual;
pub use register_result::RegisterManualResult;
pub use schema::JsonSchema;
pub use tool::Tool;

/// The UTCP protocol version this crate implements.
pub const UTCP_VERSION: &str = "1.0.1";
