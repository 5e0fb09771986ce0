//! OAuth2 client-credentials grant, shared by the HTTP and MCP transports.
//!
//! Narrowed to the one grant a trusted backend-to-backend client needs —
//! authorization-code and device flows are out of scope here. Token caching
//! (keyed by `(token_url, client_id, scope)`) is layered on top by callers
//! that need it — see `utcp-mcp::oauth`.

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl};

use crate::error::{Result, UtcpError};

/// A fetched bearer token plus the information needed to decide when to
/// refresh it.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    /// Seconds from acquisition until expiry, if the server reported one.
    pub expires_in: Option<u64>,
}

/// Perform the OAuth2 client-credentials grant against `token_url`.
pub async fn fetch_client_credentials_token(
    http_client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    scope: Option<&str>,
) -> Result<TokenInfo> {
    let auth_url = AuthUrl::new(token_url.to_string())
        .map_err(|e| UtcpError::Auth { stage: "oauth2_config".to_string(), cause: e.to_string() })?;
    let token_url = TokenUrl::new(token_url.to_string())
        .map_err(|e| UtcpError::Auth { stage: "oauth2_config".to_string(), cause: e.to_string() })?;

    let client = BasicClient::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url);

    let mut request = client.exchange_client_credentials();
    if let Some(scope) = scope {
        request = request.add_scopes(scope.split_whitespace().map(|s| Scope::new(s.to_string())));
    }

    let response = request
        .request_async(http_client)
        .await
        .map_err(|e| UtcpError::Auth {
            stage: "oauth2_client_credentials".to_string(),
            cause: e.to_string(),
        })?;

    Ok(TokenInfo {
        access_token: response.access_token().secret().clone(),
        expires_in: response.expires_in().map(|d| d.as_secs()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_and_parses_a_client_credentials_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("scope=read+write"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-abc123",
                "token_type": "bearer",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let http_client = reqwest::Client::new();
        let token = fetch_client_credentials_token(
            &http_client,
            &format!("{}/token", server.uri()),
            "client-id",
            "client-secret",
            Some("read write"),
        )
        .await
        .unwrap();

        assert_eq!(token.access_token, "tok-abc123");
        assert_eq!(token.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn token_endpoint_error_surfaces_as_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
            })))
            .mount(&server)
            .await;

        let http_client = reqwest::Client::new();
        let err = fetch_client_credentials_token(
            &http_client,
            &format!("{}/token", server.uri()),
            "client-id",
            "wrong-secret",
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UtcpError::Auth { .. }));
    }
}
