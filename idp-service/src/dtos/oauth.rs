use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query of `POST /login/oauth/code`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct CodeParams {
    /// `organization/username` of the signed-in user.
    #[param(example = "built-in/admin")]
    pub user_id: String,
    pub client_id: String,
    #[param(example = "code")]
    pub response_type: String,
    pub redirect_uri: String,
    #[param(example = "openid profile email")]
    pub scope: String,
    pub state: String,
    pub nonce: String,
    /// `S256`, or empty / `null` for no PKCE.
    #[param(example = "S256")]
    pub code_challenge_method: String,
    pub code_challenge: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CodeResponse {
    pub code: String,
    pub state: String,
}

/// Body of the token endpoints, form or JSON encoded.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct TokenRequest {
    #[schema(example = "authorization_code")]
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub refresh_token: String,
    pub scope: String,
    pub nonce: String,
    pub username: String,
    pub password: String,
    /// External identity provider tag; switches the password grant to code exchange.
    pub tag: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    #[schema(example = 604800)]
    pub expires_in: i64,
    pub scope: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct LogoutParams {
    /// Access token or id token value.
    pub id_token_hint: String,
    pub post_logout_redirect_uri: String,
    pub state: String,
}

/// Generic action payload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub msg: String,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

impl StatusResponse {
    pub fn ok(data: impl Into<serde_json::Value>) -> Self {
        Self {
            status: "ok".to_string(),
            msg: String::new(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct IntrospectRequest {
    pub token: String,
    #[schema(example = "access_token")]
    pub token_type_hint: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl IntrospectResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// OIDC userinfo, projected by the scopes of the presented token.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}
