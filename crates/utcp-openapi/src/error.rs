use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpenApiError>;

/// Errors that can occur while parsing or converting an OpenAPI document.
#[derive(Debug, Error)]
pub enum OpenApiError {
    #[error("failed to parse OpenAPI document: {0}")]
    Parse(String),

    #[error("OpenAPI document has neither 'openapi', 'swagger' nor 'paths' at its root")]
    NotAnOpenApiDocument,
}

impl From<serde_json::Error> for OpenApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for OpenApiError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
