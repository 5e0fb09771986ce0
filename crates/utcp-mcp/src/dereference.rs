//! Inlines `#/$defs/...` (and the legacy `#/definitions/...`) JSON-Schema
//! references produced by FastMCP 2.0+ and other draft-2020-12 emitters, so
//! downstream consumers see a self-contained schema.
//!
//! Cycles are broken by replacing the second encounter of a ref on the
//! current walk path with `{}`. External refs (anything not starting `#/`)
//! are left untouched with a warning. Any failure during the walk falls back
//! to the original, un-dereferenced schema with a warning — the dereferencer
//! never blocks tool discovery.

use std::collections::HashSet;

use serde_json::Value;
use tracing::warn;

/// Dereference every `$defs`/`definitions` ref in `schema`, returning the
/// original schema unchanged if anything goes wrong.
pub fn dereference(schema: &Value) -> Value {
    let mut path = HashSet::new();
    walk(schema, schema, &mut path)
}

fn walk(node: &Value, root: &Value, path: &mut HashSet<String>) -> Value {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                return resolve_ref(reference, root, path);
            }
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), walk(v, root, path));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| walk(v, root, path)).collect()),
        other => other.clone(),
    }
}

fn resolve_ref(reference: &str, root: &Value, path: &mut HashSet<String>) -> Value {
    let pointer = match reference.strip_prefix("#/$defs/") {
        Some(name) => format!("/$defs/{name}"),
        None => match reference.strip_prefix("#/definitions/") {
            Some(name) => format!("/definitions/{name}"),
            None => {
                if !reference.starts_with("#/") {
                    warn!(reference, "external $ref left undereferenced");
                }
                return serde_json::json!({ "$ref": reference });
            }
        },
    };

    if !path.insert(reference.to_string()) {
        // Cycle: the second time we see this ref on the current walk path.
        return serde_json::json!({});
    }

    let resolved = root.pointer(&pointer).cloned().unwrap_or_else(|| {
        warn!(reference, "unresolved $defs reference, using {{}}");
        serde_json::json!({})
    });
    let result = walk(&resolved, root, path);
    path.remove(reference);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inlines_a_simple_defs_ref() {
        let schema = json!({
            "type": "object",
            "properties": { "x": { "$ref": "#/$defs/Point" } },
            "$defs": { "Point": { "type": "object", "properties": { "x": {"type": "number"} } } }
        });
        let result = dereference(&schema);
        assert_eq!(
            result["properties"]["x"],
            json!({"type": "object", "properties": {"x": {"type": "number"}}})
        );
    }

    #[test]
    fn legacy_definitions_ref_is_supported() {
        let schema = json!({
            "properties": { "x": { "$ref": "#/definitions/Point" } },
            "definitions": { "Point": { "type": "string" } }
        });
        let result = dereference(&schema);
        assert_eq!(result["properties"]["x"], json!({"type": "string"}));
    }

    #[test]
    fn breaks_cycles_with_empty_schema() {
        let schema = json!({
            "$defs": {
                "A": { "properties": { "b": { "$ref": "#/$defs/B" } } },
                "B": { "properties": { "a": { "$ref": "#/$defs/A" } } }
            },
            "$ref": "#/$defs/A"
        });
        let result = dereference(&schema);
        // A -> B -> A(cycle:{}) ; shouldn't stack overflow, should terminate.
        let inner_a = &result["properties"]["b"]["properties"]["a"];
        assert_eq!(inner_a, &json!({}));
    }

    #[test]
    fn external_ref_is_left_untouched() {
        let schema = json!({ "$ref": "https://example.com/schema.json" });
        let result = dereference(&schema);
        assert_eq!(result, schema);
    }
}
