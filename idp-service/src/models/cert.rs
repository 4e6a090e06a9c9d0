use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// RSA signing key pair. Applications reference certificates by name.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cert {
    pub owner: String,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub display_name: String,
    /// `RS256`, `RS384` or `RS512`.
    #[serde(default = "default_algorithm")]
    pub crypto_algorithm: String,
    #[serde(default = "default_bit_size")]
    pub bit_size: usize,
    /// PEM encoded SubjectPublicKeyInfo.
    pub public_key: String,
    /// PEM encoded PKCS#8 private key. Never serialized.
    #[serde(skip_serializing, default)]
    pub private_key: String,
}

fn default_algorithm() -> String {
    "RS256".to_string()
}

fn default_bit_size() -> usize {
    4096
}

impl Cert {
    pub fn id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
