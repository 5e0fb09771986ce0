use openapiv3::OpenAPI;
use serde_json::Value;

use crate::error::{OpenApiError, Result};

/// Whether a format hint says to parse as YAML (`.yaml`/`.yml`) rather than
/// JSON (the file/text transport's extension-based rule).
pub fn is_yaml_extension(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".yaml") || lower.ends_with(".yml")
}

/// Parse raw file contents as either JSON or YAML into a generic
/// [`serde_json::Value`], used by the file/text transport to classify a
/// manual before deciding whether to hand it to this crate or treat it as a
/// native UTCP manual.
pub fn parse_value(contents: &str, as_yaml: bool) -> Result<Value> {
    if as_yaml {
        Ok(serde_yaml::from_str(contents)?)
    } else {
        Ok(serde_json::from_str(contents)?)
    }
}

/// Whether a parsed document's root object contains any of `openapi`,
/// `swagger`, or `paths` — the detection rule for "this is an OpenAPI
/// document, not a native UTCP manual."
pub fn looks_like_openapi(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => map.contains_key("openapi") || map.contains_key("swagger") || map.contains_key("paths"),
        None => false,
    }
}

/// Parse a [`Value`] already known to be an OpenAPI document into the typed
/// `openapiv3::OpenAPI` model.
pub fn parse_openapi(value: Value) -> Result<OpenAPI> {
    if !looks_like_openapi(&value) {
        return Err(OpenApiError::NotAnOpenApiDocument);
    }
    serde_json::from_value(value).map_err(|e| OpenApiError::Parse(e.to_string()))
}

/// Convenience: parse raw text straight into an `OpenAPI` document, picking
/// JSON or YAML by extension.
pub fn parse_spec(contents: &str, as_yaml: bool) -> Result<OpenAPI> {
    parse_openapi(parse_value(contents, as_yaml)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_openapi_by_paths_key() {
        let v: Value = serde_json::from_str(r#"{"paths": {}}"#).unwrap();
        assert!(looks_like_openapi(&v));
    }

    #[test]
    fn native_manual_is_not_openapi() {
        let v: Value = serde_json::from_str(
            r#"{"utcp_version":"1.0.1","manual_version":"1.0.0","tools":[]}"#,
        )
        .unwrap();
        assert!(!looks_like_openapi(&v));
    }

    #[test]
    fn parses_minimal_yaml_spec() {
        let yaml = "openapi: 3.0.0\ninfo:\n  title: t\n  version: \"1\"\npaths: {}\n";
        let spec = parse_spec(yaml, true).unwrap();
        assert_eq!(spec.info.title, "t");
    }
}
