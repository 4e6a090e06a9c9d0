use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Placeholder returned instead of the stored master password hash.
pub const MASKED_SECRET: &str = "***";

/// Name of the organization created at boot; it can never be renamed.
pub const BUILT_IN_ORGANIZATION: &str = "built-in";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub owner: String,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub website_url: String,
    /// One of `plain`, `salt`, `md5-salt`, `argon2id`.
    #[serde(default = "default_password_type")]
    pub password_type: String,
    #[serde(default)]
    pub password_salt: String,
    /// Hashed with `password_type` and an empty user salt. Empty means none.
    #[serde(default)]
    pub master_password: String,
    #[serde(default)]
    pub default_avatar: String,
}

fn default_password_type() -> String {
    "plain".to_string()
}

impl Organization {
    pub fn id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Copy safe to hand out over the API.
    pub fn masked(&self) -> Self {
        let mut org = self.clone();
        if !org.master_password.is_empty() {
            org.master_password = MASKED_SECRET.to_string();
        }
        org
    }
}
