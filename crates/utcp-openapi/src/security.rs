//! Resolves OpenAPI security scheme references into a [`utcp_types::Auth`].
//!
//! The converter only uses this as a fallback: a caller-supplied `auth_tools`
//! override (see [`crate::ConversionContext`]) always wins, since the
//! document itself never carries secret values — only which scheme applies.

use openapiv3::{OpenAPI, Operation, ReferenceOr, SecurityScheme};
use utcp_types::{Auth, ApiKeyLocation};

/// Resolve the effective security requirement for one operation: its own
/// `security` array if present, else the document's global `security`.
pub fn resolve_operation_auth(operation: &Operation, spec: &OpenAPI) -> Option<Auth> {
    let requirements = operation
        .security
        .as_ref()
        .filter(|s| !s.is_empty())
        .or(spec.security.as_ref())?;

    let scheme_name = requirements.iter().find_map(|req| req.keys().next())?;
    let scheme = lookup_scheme(scheme_name, spec)?;
    scheme_to_auth(scheme_name, scheme)
}

fn lookup_scheme<'a>(name: &str, spec: &'a OpenAPI) -> Option<&'a SecurityScheme> {
    let components = spec.components.as_ref()?;
    match components.security_schemes.get(name)? {
        ReferenceOr::Item(scheme) => Some(scheme),
        ReferenceOr::Reference { reference } => {
            let referenced = reference.strip_prefix("#/components/securitySchemes/")?;
            lookup_scheme(referenced, spec)
        }
    }
}

/// The env-style name used inside `${...}` to look up the secret value
/// itself. This is deliberately distinct from `Auth::ApiKey::var_name`
/// (which doubles as the literal wire key `HttpTransport` sends the
/// credential under, per `DESIGN.md`) — a scheme's real wire key (e.g.
/// `X-API-Key`) isn't a valid `${...}` placeholder name, so the two can't
/// share one value.
fn env_placeholder_name(scheme_name: &str) -> String {
    let sanitized: String = scheme_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{sanitized}_API_KEY")
}

fn scheme_to_auth(scheme_name: &str, scheme: &SecurityScheme) -> Option<Auth> {
    let env_var = env_placeholder_name(scheme_name);
    match scheme {
        SecurityScheme::APIKey { location, name, .. } => {
            let location = match location {
                openapiv3::APIKeyLocation::Header => ApiKeyLocation::Header,
                openapiv3::APIKeyLocation::Query => ApiKeyLocation::Query,
                openapiv3::APIKeyLocation::Cookie => ApiKeyLocation::Cookie,
            };
            // `name` is the scheme's declared wire key (e.g. `X-API-Key`);
            // it becomes `var_name` so the credential is attached under the
            // key the server actually expects, not a synthesized one.
            Some(Auth::ApiKey {
                var_name: name.clone(),
                api_key: format!("${{{env_var}}}"),
                location,
            })
        }
        SecurityScheme::HTTP { scheme: http_scheme, .. } if http_scheme.eq_ignore_ascii_case("bearer") => {
            Some(Auth::ApiKey {
                var_name: "Authorization".to_string(),
                api_key: format!("Bearer ${{{env_var}}}"),
                location: ApiKeyLocation::Header,
            })
        }
        // OAuth2, OpenID Connect, and non-bearer HTTP schemes need an
        // interactive or out-of-band flow this converter can't synthesize;
        // callers pass `auth_tools` explicitly for those.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_with_security_scheme(scheme: serde_json::Value) -> OpenAPI {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/thing": {
                    "get": {
                        "operationId": "getThing",
                        "security": [{"apiKeyAuth": []}],
                        "responses": {"200": {"description": "OK"}}
                    }
                }
            },
            "components": {
                "securitySchemes": {"apiKeyAuth": scheme}
            }
        });
        serde_json::from_value(doc).unwrap()
    }

    #[test]
    fn api_key_scheme_uses_its_declared_wire_name() {
        let spec = spec_with_security_scheme(json!({
            "type": "apiKey",
            "in": "header",
            "name": "X-API-Key"
        }));
        let operation = spec.paths.paths["/thing"].as_item().unwrap().get.as_ref().unwrap();
        let auth = resolve_operation_auth(operation, &spec).unwrap();
        match auth {
            Auth::ApiKey { var_name, api_key, location } => {
                assert_eq!(var_name, "X-API-Key");
                assert_eq!(api_key, "${APIKEYAUTH_API_KEY}");
                assert_eq!(location, ApiKeyLocation::Header);
            }
            other => panic!("expected ApiKey, got {other:?}"),
        }
    }

    #[test]
    fn bearer_http_scheme_targets_authorization_header() {
        let spec = spec_with_security_scheme(json!({
            "type": "http",
            "scheme": "bearer"
        }));
        let operation = spec.paths.paths["/thing"].as_item().unwrap().get.as_ref().unwrap();
        let auth = resolve_operation_auth(operation, &spec).unwrap();
        match auth {
            Auth::ApiKey { var_name, api_key, .. } => {
                assert_eq!(var_name, "Authorization");
                assert_eq!(api_key, "Bearer ${APIKEYAUTH_API_KEY}");
            }
            other => panic!("expected ApiKey, got {other:?}"),
        }
    }
}
