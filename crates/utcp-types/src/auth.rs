use serde::{Deserialize, Serialize};

/// Where an API key credential is attached to an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

/// Authentication attached to a [`crate::CallTemplate`].
///
/// Secret-bearing string fields (`api_key`, `password`, `client_secret`) may
/// contain `${NAME}` placeholders that the variable resolver substitutes
/// before the template is ever handed to a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum Auth {
    ApiKey {
        var_name: String,
        api_key: String,
        location: ApiKeyLocation,
    },
    Basic {
        username: String,
        password: String,
    },
    OAuth2 {
        token_url: String,
        client_id: String,
        client_secret: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
}
