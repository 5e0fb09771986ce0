//! Converts OpenAPI 2.0/3.x documents into UTCP [`utcp_types::Manual`]s, one
//! tool per `(path, method)` operation, with fresh `http` call templates.
//!
//! Also carries the document-classification helpers (`looks_like_openapi`,
//! `is_yaml_extension`) the file/text transport uses to decide whether a
//! loaded document belongs here or should be validated as a native manual.

mod converter;
mod error;
mod parser;
mod schema;
mod security;

pub use converter::{convert, slugify_operation, ConversionContext};
pub use error::{OpenApiError, Result};
pub use parser::{is_yaml_extension, looks_like_openapi, parse_openapi, parse_spec, parse_value};
pub use security::resolve_operation_auth;
