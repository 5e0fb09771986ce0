//! OpenAPI `Schema` → JSON Schema conversion, including `$ref` dereferencing
//! and `allOf`/`oneOf`/`anyOf` collapsing.
//!
//! Unknown constructs fall back to `{}` rather than erroring, so a document
//! using a schema shape we don't model still produces a usable (if
//! under-specified) tool.

use std::collections::HashSet;

use openapiv3::{AnySchema, OpenAPI, ReferenceOr, Schema, SchemaKind, Type};
use serde_json::{Map, Value, json};

/// Convert a possibly-referenced OpenAPI schema into a plain JSON Schema
/// value, fully dereferencing `#/components/schemas/...` refs and merging
/// `allOf` branches. `oneOf`/`anyOf` collapse to the first resolvable
/// branch.
pub fn resolve(schema_ref: &ReferenceOr<Schema>, spec: &OpenAPI) -> Value {
    let mut seen = HashSet::new();
    resolve_inner(schema_ref, spec, &mut seen)
}

fn resolve_inner(
    schema_ref: &ReferenceOr<Schema>,
    spec: &OpenAPI,
    seen: &mut HashSet<String>,
) -> Value {
    match schema_ref {
        ReferenceOr::Reference { reference } => {
            if !seen.insert(reference.clone()) {
                // Cycle: break it with an empty schema rather than recursing forever.
                return json!({});
            }
            let resolved = component_schema(reference, spec);
            let value = match resolved {
                Some(schema) => schema_to_value(schema, spec, seen),
                None => {
                    tracing::warn!(reference, "unresolved OpenAPI schema $ref, using {{}}");
                    json!({})
                }
            };
            seen.remove(reference);
            value
        }
        ReferenceOr::Item(schema) => schema_to_value(schema, spec, seen),
    }
}

fn component_schema<'a>(reference: &str, spec: &'a OpenAPI) -> Option<&'a Schema> {
    let name = reference.strip_prefix("#/components/schemas/")?;
    let components = spec.components.as_ref()?;
    match components.schemas.get(name)? {
        ReferenceOr::Item(schema) => Some(schema),
        ReferenceOr::Reference { reference } => component_schema(reference, spec),
    }
}

fn schema_to_value(schema: &Schema, spec: &OpenAPI, seen: &mut HashSet<String>) -> Value {
    match &schema.schema_kind {
        SchemaKind::Type(ty) => type_to_value(ty, spec, seen),
        SchemaKind::AllOf { all_of } => merge_all_of(all_of, spec, seen),
        SchemaKind::OneOf { one_of } => first_resolvable(one_of, spec, seen),
        SchemaKind::AnyOf { any_of } => first_resolvable(any_of, spec, seen),
        SchemaKind::Not { .. } => json!({}),
        SchemaKind::Any(any) => any_schema_to_value(any, spec, seen),
    }
}

fn type_to_value(ty: &Type, spec: &OpenAPI, seen: &mut HashSet<String>) -> Value {
    match ty {
        Type::String(s) => {
            let mut obj = Map::new();
            obj.insert("type".to_string(), json!("string"));
            if let Some(format) = format_string(&s.format) {
                obj.insert("format".to_string(), json!(format));
            }
            if !s.enumeration.is_empty() {
                let values: Vec<Value> = s
                    .enumeration
                    .iter()
                    .filter_map(|v| v.clone().map(Value::String))
                    .collect();
                if !values.is_empty() {
                    obj.insert("enum".to_string(), Value::Array(values));
                }
            }
            Value::Object(obj)
        }
        Type::Number(_) => json!({"type": "number"}),
        Type::Integer(_) => json!({"type": "integer"}),
        Type::Boolean(_) => json!({"type": "boolean"}),
        Type::Object(o) => {
            let mut properties = Map::new();
            for (name, prop) in &o.properties {
                let prop_ref = prop.clone().unbox();
                properties.insert(name.clone(), resolve_inner(&prop_ref, spec, seen));
            }
            let mut obj = Map::new();
            obj.insert("type".to_string(), json!("object"));
            obj.insert("properties".to_string(), Value::Object(properties));
            if !o.required.is_empty() {
                obj.insert("required".to_string(), json!(o.required));
            }
            Value::Object(obj)
        }
        Type::Array(a) => {
            let items = match &a.items {
                Some(items) => resolve_inner(&items.clone().unbox(), spec, seen),
                None => json!({}),
            };
            json!({"type": "array", "items": items})
        }
    }
}

fn format_string(format: &openapiv3::VariantOrUnknownOrEmpty<openapiv3::StringFormat>) -> Option<String> {
    use openapiv3::VariantOrUnknownOrEmpty;
    match format {
        VariantOrUnknownOrEmpty::Item(f) => Some(
            match f {
                openapiv3::StringFormat::Date => "date",
                openapiv3::StringFormat::DateTime => "date-time",
                openapiv3::StringFormat::Password => "password",
                openapiv3::StringFormat::Byte => "byte",
                openapiv3::StringFormat::Binary => "binary",
            }
            .to_string(),
        ),
        VariantOrUnknownOrEmpty::Unknown(s) => Some(s.clone()),
        VariantOrUnknownOrEmpty::Empty => None,
    }
}

/// `allOf` merges every branch's `properties`/`required` into one object
/// schema.
fn merge_all_of(branches: &[ReferenceOr<Schema>], spec: &OpenAPI, seen: &mut HashSet<String>) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();
    let mut merged_type: Option<Value> = None;

    for branch in branches {
        let value = resolve_inner(branch, spec, seen);
        if let Some(obj) = value.as_object() {
            if let Some(props) = obj.get("properties").and_then(Value::as_object) {
                for (k, v) in props {
                    properties.insert(k.clone(), v.clone());
                }
            }
            if let Some(req) = obj.get("required").and_then(Value::as_array) {
                for r in req {
                    if !required.contains(r) {
                        required.push(r.clone());
                    }
                }
            }
            if merged_type.is_none() {
                merged_type = obj.get("type").cloned();
            }
        }
    }

    let mut obj = Map::new();
    obj.insert(
        "type".to_string(),
        merged_type.unwrap_or_else(|| json!("object")),
    );
    if !properties.is_empty() {
        obj.insert("properties".to_string(), Value::Object(properties));
    }
    if !required.is_empty() {
        obj.insert("required".to_string(), Value::Array(required));
    }
    Value::Object(obj)
}

/// `oneOf`/`anyOf` collapse to the first resolvable branch.
fn first_resolvable(branches: &[ReferenceOr<Schema>], spec: &OpenAPI, seen: &mut HashSet<String>) -> Value {
    branches
        .first()
        .map(|b| resolve_inner(b, spec, seen))
        .unwrap_or_else(|| json!({}))
}

fn any_schema_to_value(any: &AnySchema, spec: &OpenAPI, seen: &mut HashSet<String>) -> Value {
    if !any.properties.is_empty() {
        let mut properties = Map::new();
        for (name, prop) in &any.properties {
            properties.insert(name.clone(), resolve_inner(&prop.clone().unbox(), spec, seen));
        }
        let mut obj = Map::new();
        obj.insert("type".to_string(), json!("object"));
        obj.insert("properties".to_string(), Value::Object(properties));
        if !any.required.is_empty() {
            obj.insert("required".to_string(), json!(any.required));
        }
        return Value::Object(obj);
    }
    // Unknown/unmodeled construct (e.g. a bare `{}` schema): empty fallback.
    json!({})
}
