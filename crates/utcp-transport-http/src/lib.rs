//! HTTP `CommunicationProtocol` for the `http` call template.
//!
//! This is the transport every OpenAPI-derived tool dispatches through, and
//! it can also be registered directly as a one-tool manual: the template's
//! own `name` becomes both the manual name and the (single) tool name.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use utcp_core::{
    fetch_client_credentials_token, ClientContext, CommunicationProtocol, Result, ToolCallStream,
    TransportErrorKind, UtcpError,
};
use utcp_types::{ApiKeyLocation, Auth, CallTemplate, HttpCallTemplate, HttpMethod, JsonSchema, Manual,
    RegisterManualResult, Tool};

#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn apply_auth(
        &self,
        request: reqwest::RequestBuilder,
        auth: &Option<Auth>,
    ) -> Result<reqwest::RequestBuilder> {
        let Some(auth) = auth else {
            return Ok(request);
        };
        match auth {
            Auth::ApiKey { var_name, api_key, location } => Ok(match location {
                ApiKeyLocation::Header => request.header(var_name.as_str(), api_key.clone()),
                ApiKeyLocation::Query => request.query(&[(var_name.as_str(), api_key.as_str())]),
                ApiKeyLocation::Cookie => request.header("Cookie", format!("{var_name}={api_key}")),
            }),
            Auth::Basic { username, password } => Ok(request.basic_auth(username, Some(password))),
            Auth::OAuth2 { token_url, client_id, client_secret, scope } => {
                let token = fetch_client_credentials_token(
                    &self.client,
                    token_url,
                    client_id,
                    client_secret,
                    scope.as_deref(),
                )
                .await?;
                Ok(request.bearer_auth(token.access_token))
            }
        }
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }

    /// Splits the call's JSON-object arguments into (path-substituted URL,
    /// header values, query pairs, body value) per `header_fields` and
    /// `body_field` on the template.
    fn split_args(tmpl: &HttpCallTemplate, args: &Map<String, Value>) -> (String, HashMap<String, String>, Vec<(String, String)>, Option<Value>) {
        let mut url = tmpl.url.clone();
        let mut headers = HashMap::new();
        let mut query = Vec::new();
        let mut body_properties = Map::new();
        let mut explicit_body: Option<Value> = None;

        for (key, value) in args {
            let placeholder = format!("{{{key}}}");
            if url.contains(&placeholder) {
                url = url.replace(&placeholder, &value_to_path_segment(value));
                continue;
            }
            if tmpl.header_fields.iter().any(|h| h == key) {
                headers.insert(key.clone(), value_to_path_segment(value));
                continue;
            }
            if let Some(body_field) = &tmpl.body_field {
                if key == body_field {
                    explicit_body = Some(value.clone());
                    continue;
                }
            }
            if matches!(tmpl.http_method, HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete) {
                query.push((key.clone(), value_to_path_segment(value)));
            } else {
                body_properties.insert(key.clone(), value.clone());
            }
        }

        let body = explicit_body.or_else(|| {
            (!body_properties.is_empty()).then(|| Value::Object(body_properties))
        });

        (url, headers, query, body)
    }
}

fn value_to_path_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl CommunicationProtocol for HttpTransport {
    async fn register_manual(
        &self,
        _client: &ClientContext,
        template: &CallTemplate,
    ) -> RegisterManualResult {
        let CallTemplate::Http(tmpl) = template else {
            return RegisterManualResult::failure(
                template.clone(),
                vec!["http transport received a non-http call template".to_string()],
            );
        };

        let manual = Manual {
            name: tmpl.name.clone(),
            utcp_version: utcp_types::UTCP_VERSION.to_string(),
            manual_version: "1.0.0".to_string(),
            tools: vec![Tool {
                name: tmpl.name.clone(),
                description: String::new(),
                tags: Default::default(),
                inputs: JsonSchema::empty(),
                outputs: JsonSchema::empty(),
                tool_call_template: template.clone(),
            }],
        };
        RegisterManualResult::success(template.clone(), manual)
    }

    async fn deregister_manual(&self, _client: &ClientContext, _template: &CallTemplate) -> Result<()> {
        Ok(())
    }

    async fn call_tool(
        &self,
        _client: &ClientContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> Result<Value> {
        let CallTemplate::Http(tmpl) = template else {
            return Err(UtcpError::configuration(
                "http transport received a non-http call template",
            ));
        };

        let args_map = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(UtcpError::configuration(format!(
                    "http tool '{tool_name}' expects an object of arguments, got {other}"
                )))
            }
        };

        let (url, extra_headers, query, body) = Self::split_args(tmpl, &args_map);

        let mut header_map = HeaderMap::new();
        for (k, v) in tmpl.headers.iter().chain(extra_headers.iter()) {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
                header_map.insert(name, value);
            }
        }

        let mut request = self
            .client
            .request(Self::method(tmpl.http_method), &url)
            .headers(header_map)
            .query(&query);

        if let Some(body) = &body {
            request = request
                .header("Content-Type", tmpl.content_type.clone())
                .json(body);
        }

        request = self.apply_auth(request, &tmpl.auth).await?;

        debug!(tool = tool_name, url = %url, method = tmpl.http_method.as_str(), "http tool call");

        let response = request.send().await.map_err(|e| {
            warn!(tool = tool_name, error = %e, "http call failed");
            UtcpError::transport(TransportErrorKind::Connect, e.to_string())
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            UtcpError::transport(TransportErrorKind::Read, e.to_string())
        })?;

        if !status.is_success() {
            return Err(UtcpError::ToolCall {
                tool_name: tool_name.to_string(),
                message: format!("HTTP {status}: {text}"),
            });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(text)),
        }
    }

    async fn call_tool_streaming(
        &self,
        client: &ClientContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> Result<ToolCallStream> {
        let result = self.call_tool(client, tool_name, args, template).await;
        Ok(Box::pin(futures::stream::once(async move { result })))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utcp_types::FileCallTemplate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> ClientContext {
        ClientContext::new(".")
    }

    #[tokio::test]
    async fn calls_get_and_parses_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/add"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(25)))
            .mount(&server)
            .await;

        let tmpl = CallTemplate::Http(HttpCallTemplate {
            name: "m_add".to_string(),
            url: format!("{}/add", server.uri()),
            http_method: HttpMethod::Get,
            content_type: "application/json".to_string(),
            headers: Default::default(),
            body_field: None,
            header_fields: Vec::new(),
            auth: None,
            allowed_communication_protocols: None,
        });

        let transport = HttpTransport::new();
        let result = transport
            .call_tool(&ctx(), "add", serde_json::json!({"a": 20, "b": 5}), &tmpl)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(25));
    }

    #[tokio::test]
    async fn non_2xx_status_is_a_tool_call_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fail"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let tmpl = CallTemplate::Http(HttpCallTemplate {
            name: "m_fail".to_string(),
            url: format!("{}/fail", server.uri()),
            http_method: HttpMethod::Post,
            content_type: "application/json".to_string(),
            headers: Default::default(),
            body_field: None,
            header_fields: Vec::new(),
            auth: None,
            allowed_communication_protocols: None,
        });

        let transport = HttpTransport::new();
        let err = transport
            .call_tool(&ctx(), "fail", serde_json::json!({}), &tmpl)
            .await
            .unwrap_err();
        assert!(matches!(err, UtcpError::ToolCall { .. }));
    }

    #[tokio::test]
    async fn api_key_auth_is_sent_under_its_var_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure"))
            .and(wiremock::matchers::header("X-Api-Key", "secret123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let tmpl = CallTemplate::Http(HttpCallTemplate {
            name: "m_secure".to_string(),
            url: format!("{}/secure", server.uri()),
            http_method: HttpMethod::Get,
            content_type: "application/json".to_string(),
            headers: Default::default(),
            body_field: None,
            header_fields: Vec::new(),
            auth: Some(utcp_types::Auth::ApiKey {
                var_name: "X-Api-Key".to_string(),
                api_key: "secret123".to_string(),
                location: utcp_types::ApiKeyLocation::Header,
            }),
            allowed_communication_protocols: None,
        });

        let transport = HttpTransport::new();
        let result = transport.call_tool(&ctx(), "secure", serde_json::json!({}), &tmpl).await.unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn register_manual_rejects_wrong_template_type() {
        let transport = HttpTransport::new();
        let tmpl = CallTemplate::File(FileCallTemplate {
            name: "m".to_string(),
            file_path: "x.json".to_string(),
            auth_tools: None,
            auth: None,
            allowed_communication_protocols: None,
        });
        let result = transport.register_manual(&ctx(), &tmpl).await;
        assert!(!result.success);
    }
}
