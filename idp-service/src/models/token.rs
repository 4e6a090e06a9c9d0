use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One issued (access, refresh, id) token triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub owner: String,
    /// Unique record name.
    pub name: String,
    pub created_time: DateTime<Utc>,
    /// Application name.
    pub application: String,
    pub organization: String,
    /// User name; empty for client-credentials tokens.
    pub user: String,
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    /// SHA-256 of the access token, safe to list.
    pub access_token_hash: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub scope: String,
    pub token_type: String,
    #[serde(default)]
    pub access_revoked: bool,
    #[serde(default)]
    pub refresh_revoked: bool,
}

/// Lifetimes and values of a freshly minted triple.
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
}

impl Token {
    pub fn new(
        application: &str,
        organization: &str,
        user: &str,
        scope: &str,
        issued: IssuedTokens,
    ) -> Self {
        let now = Utc::now();
        Self {
            owner: "admin".to_string(),
            name: uuid::Uuid::new_v4().to_string(),
            created_time: now,
            application: application.to_string(),
            organization: organization.to_string(),
            user: user.to_string(),
            access_token_hash: hash_token(&issued.access_token),
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            id_token: issued.id_token,
            access_expires_at: now + issued.access_lifetime,
            refresh_expires_at: now + issued.refresh_lifetime,
            scope: scope.to_string(),
            token_type: "Bearer".to_string(),
            access_revoked: false,
            refresh_revoked: false,
        }
    }

    pub fn expires_in(&self) -> i64 {
        (self.access_expires_at - self.created_time).num_seconds()
    }

    pub fn is_access_active(&self) -> bool {
        !self.access_revoked && Utc::now() < self.access_expires_at
    }

    pub fn is_refresh_active(&self) -> bool {
        !self.refresh_token.is_empty() && !self.refresh_revoked && Utc::now() < self.refresh_expires_at
    }

    /// Seconds until the record can be forgotten.
    pub fn retention_seconds(&self) -> i64 {
        let until = self.refresh_expires_at.max(self.access_expires_at);
        (until - Utc::now()).num_seconds().max(1)
    }
}

/// Hash a token using SHA-256
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
