use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Authorization codes are single-use and live for five minutes.
pub const CODE_TTL_SECONDS: i64 = 300;

/// PKCE binding carried by a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    pub challenge: String,
    /// Only `S256` is accepted at issuance.
    pub method: String,
}

/// Everything a code is bound to, as requested at issuance.
#[derive(Debug, Clone)]
pub struct CodeRequest {
    pub application: String,
    pub organization: String,
    pub user: String,
    pub redirect_uri: String,
    pub scope: String,
    pub nonce: String,
    pub state: String,
    pub pkce: Option<PkceChallenge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    /// Application name.
    pub application: String,
    pub organization: String,
    pub user: String,
    pub redirect_uri: String,
    pub scope: String,
    pub nonce: String,
    pub state: String,
    pub pkce: Option<PkceChallenge>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn new(code: String, request: CodeRequest) -> Self {
        let now = Utc::now();
        Self {
            code,
            application: request.application,
            organization: request.organization,
            user: request.user,
            redirect_uri: request.redirect_uri,
            scope: request.scope,
            nonce: request.nonce,
            state: request.state,
            pkce: request.pkce,
            created_at: now,
            expires_at: now + Duration::seconds(CODE_TTL_SECONDS),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
