use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::Token;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct OrganizationParams {
    /// `admin/<organization name>`.
    #[param(example = "admin/built-in")]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct TokensParams {
    /// Application name.
    #[param(example = "app-built-in")]
    pub application: String,
    /// `organization/username`.
    #[param(example = "built-in/admin")]
    pub user_id: String,
}

/// Token record without the token values.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub name: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_time: DateTime<Utc>,
    pub application: String,
    pub organization: String,
    pub user: String,
    /// SHA-256 of the access token.
    pub access_token_hash: String,
    pub scope: String,
    pub token_type: String,
    #[schema(example = 604800)]
    pub expires_in: i64,
    pub access_active: bool,
    pub refresh_active: bool,
}

impl From<&Token> for TokenSummary {
    fn from(token: &Token) -> Self {
        Self {
            name: token.name.clone(),
            created_time: token.created_time,
            application: token.application.clone(),
            organization: token.organization.clone(),
            user: token.user.clone(),
            access_token_hash: token.access_token_hash.clone(),
            scope: token.scope.clone(),
            token_type: token.token_type.clone(),
            expires_in: token.expires_in(),
            access_active: token.is_access_active(),
            refresh_active: token.is_refresh_active(),
        }
    }
}
