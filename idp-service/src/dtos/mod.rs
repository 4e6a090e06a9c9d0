pub mod admin;
pub mod oauth;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Unauthorized operation")]
    pub error: String,
}

/// OAuth error body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthErrorResponse {
    #[schema(example = "invalid_grant")]
    pub error: String,
    pub error_description: String,
}
