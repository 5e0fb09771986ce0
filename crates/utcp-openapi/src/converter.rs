//! Maps `paths × methods` in a parsed OpenAPI document to UTCP [`Tool`]s with
//! fresh `http` call templates, one per operation.

use std::collections::BTreeSet;

use openapiv3::{Operation, Parameter, ParameterSchemaOrContent, PathItem, ReferenceOr};
use serde_json::{Map, Value, json};
use utcp_types::{Auth, CallTemplate, HttpCallTemplate, HttpMethod, JsonSchema, Manual, Tool};

use crate::schema::resolve as resolve_schema;
use crate::security::resolve_operation_auth;

/// Context the caller supplies alongside the parsed document: where it came
/// from, what to name the resulting manual, and an optional blanket auth
/// override for every derived tool.
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    /// The URL or file path the OpenAPI document was loaded from, used to
    /// derive a default server base URL when the document doesn't declare
    /// one.
    pub spec_url: Option<String>,
    pub call_template_name: String,
    /// Overrides auth derived from the document's security schemes.
    pub auth_tools: Option<Auth>,
}

const METHODS: &[(&str, fn(&PathItem) -> &Option<Operation>)] = &[
    ("GET", |p| &p.get),
    ("PUT", |p| &p.put),
    ("POST", |p| &p.post),
    ("DELETE", |p| &p.delete),
    ("OPTIONS", |p| &p.options),
    ("HEAD", |p| &p.head),
    ("PATCH", |p| &p.patch),
    ("TRACE", |p| &p.trace),
];

/// Convert a parsed OpenAPI document into a [`Manual`] with one tool per
/// `(path, method)` operation.
pub fn convert(spec: &openapiv3::OpenAPI, ctx: &ConversionContext) -> Manual {
    let base_url = base_url(spec, ctx);
    let mut tools = Vec::new();

    for (path, path_item) in &spec.paths.paths {
        let path_item = match path_item {
            ReferenceOr::Item(item) => item,
            ReferenceOr::Reference { .. } => continue,
        };

        for (method, accessor) in METHODS {
            let Some(operation) = accessor(path_item) else {
                continue;
            };
            tools.push(build_tool(
                method,
                path,
                operation,
                path_item,
                spec,
                ctx,
                &base_url,
            ));
        }
    }

    Manual {
        name: ctx.call_template_name.clone(),
        utcp_version: utcp_types::UTCP_VERSION.to_string(),
        manual_version: spec.info.version.clone(),
        tools,
    }
}

fn base_url(spec: &openapiv3::OpenAPI, ctx: &ConversionContext) -> String {
    if let Some(server) = spec.servers.first() {
        return server.url.trim_end_matches('/').to_string();
    }
    match &ctx.spec_url {
        Some(url) => derive_base_from_spec_url(url),
        None => String::new(),
    }
}

fn derive_base_from_spec_url(spec_url: &str) -> String {
    match url::Url::parse(spec_url) {
        Ok(parsed) => format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default()
        ),
        Err(_) => String::new(),
    }
}

fn build_tool(
    method: &str,
    path: &str,
    operation: &Operation,
    path_item: &PathItem,
    spec: &openapiv3::OpenAPI,
    ctx: &ConversionContext,
    base_url: &str,
) -> Tool {
    let name = operation
        .operation_id
        .clone()
        .unwrap_or_else(|| slugify_operation(method, path));

    let description = operation
        .summary
        .clone()
        .or_else(|| operation.description.clone())
        .unwrap_or_default();

    let tags: BTreeSet<String> = operation.tags.iter().cloned().collect();

    let (inputs, header_fields) = build_input_schema(operation, path_item, spec);
    let outputs = build_output_schema(operation, spec);

    let auth = ctx
        .auth_tools
        .clone()
        .or_else(|| resolve_operation_auth(operation, spec));

    let http_method = parse_method(method);
    let body_field = operation.request_body.is_some().then(|| "body".to_string());

    let tool_call_template = CallTemplate::Http(HttpCallTemplate {
        name: format!("{}_{}", ctx.call_template_name, name),
        url: format!("{base_url}{path}"),
        http_method,
        content_type: "application/json".to_string(),
        headers: Default::default(),
        body_field,
        header_fields,
        auth,
        allowed_communication_protocols: None,
    });

    Tool {
        name: format!("{}.{}", ctx.call_template_name, name),
        description,
        tags,
        inputs,
        outputs,
        tool_call_template,
    }
}

fn parse_method(method: &str) -> HttpMethod {
    match method {
        "GET" => HttpMethod::Get,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        "HEAD" => HttpMethod::Head,
        "PATCH" => HttpMethod::Patch,
        "OPTIONS" => HttpMethod::Options,
        _ => HttpMethod::Post,
    }
}

/// Builds the tool's `inputs` schema from path/query/header/cookie
/// parameters plus an optional `body` property, and returns the list of
/// parameter names that belong in `header_fields` on the call template.
///
/// Cookie parameters have no dedicated channel on [`HttpCallTemplate`]; they
/// are folded into `header_fields` alongside real headers (see `DESIGN.md`
/// for this simplification).
fn build_input_schema(
    operation: &Operation,
    path_item: &PathItem,
    spec: &openapiv3::OpenAPI,
) -> (JsonSchema, Vec<String>) {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut header_fields = Vec::new();

    let params = path_item.parameters.iter().chain(operation.parameters.iter());
    for param_ref in params {
        let ReferenceOr::Item(param) = param_ref else {
            continue;
        };
        let data = parameter_data(param);
        properties.insert(data.name.clone(), parameter_schema(param, spec));
        if data.required {
            required.push(json!(data.name));
        }
        if matches!(
            param,
            Parameter::Header { .. } | Parameter::Cookie { .. }
        ) {
            header_fields.push(data.name.clone());
        }
    }

    if let Some(ReferenceOr::Item(body)) = &operation.request_body {
        if let Some(media) = body.content.get("application/json") {
            if let Some(schema) = &media.schema {
                properties.insert("body".to_string(), resolve_schema(schema, spec));
            } else {
                properties.insert("body".to_string(), json!({}));
            }
        } else {
            properties.insert("body".to_string(), json!({}));
        }
        if body.required {
            required.push(json!("body"));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }

    (JsonSchema(Value::Object(schema)), header_fields)
}

struct ParamData {
    name: String,
    required: bool,
}

fn parameter_data(param: &Parameter) -> ParamData {
    let data = param.parameter_data_ref();
    ParamData {
        name: data.name.clone(),
        required: data.required,
    }
}

fn parameter_schema(param: &Parameter, spec: &openapiv3::OpenAPI) -> Value {
    let data = param.parameter_data_ref();
    match &data.format {
        ParameterSchemaOrContent::Schema(schema_ref) => resolve_schema(schema_ref, spec),
        ParameterSchemaOrContent::Content(content) => content
            .values()
            .next()
            .and_then(|media| media.schema.as_ref())
            .map(|schema_ref| resolve_schema(schema_ref, spec))
            .unwrap_or_else(|| json!({})),
    }
}

fn build_output_schema(operation: &Operation, spec: &openapiv3::OpenAPI) -> JsonSchema {
    for status in ["200", "201", "202", "204", "2XX", "default"] {
        if let Some(ReferenceOr::Item(response)) = operation.responses.responses.get(
            &status
                .parse::<openapiv3::StatusCode>()
                .unwrap_or(openapiv3::StatusCode::Code(200)),
        ).or_else(|| {
            (status == "default").then(|| operation.responses.default.as_ref()).flatten()
        }) {
            if let Some(media) = response.content.get("application/json") {
                if let Some(schema) = &media.schema {
                    return JsonSchema(resolve_schema(schema, spec));
                }
            }
        }
    }
    JsonSchema::empty()
}

/// A stable slug used as the tool name when an operation has no
/// `operationId`, e.g. `get_users_by_id` for `GET /users/{id}`.
pub fn slugify_operation(method: &str, path: &str) -> String {
    let mut slug = method.to_ascii_lowercase();
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        let cleaned: String = segment
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        slug.push('_');
        slug.push_str(&cleaned.trim_matches('_').to_ascii_lowercase());
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_strips_path_param_braces() {
        assert_eq!(slugify_operation("GET", "/users/{id}"), "get_users_id");
    }

    #[test]
    fn slug_handles_root_path() {
        assert_eq!(slugify_operation("GET", "/"), "get");
    }
}
