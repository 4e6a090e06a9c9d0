use service_core::axum::{extract::State, http::HeaderMap, Json};

use super::request_issuer;
use crate::dtos::{oauth::UserInfo, ErrorResponse, OAuthErrorResponse};
use crate::services::OAuthError;
use crate::utils::bearer_token;
use crate::AppState;

/// OIDC userinfo for the bearer access token
#[utoipa::path(
    get,
    path = "/api/userinfo",
    responses(
        (status = 200, description = "Claims allowed by the token's scopes", body = UserInfo),
        (status = 401, description = "Invalid, expired or revoked token", body = OAuthErrorResponse),
        (status = 403, description = "Denied by policy", body = ErrorResponse)
    ),
    tag = "OIDC",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn userinfo(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserInfo>, OAuthError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| OAuthError::invalid_request("bearer access token is required"))?;
    let issuer = request_issuer(&state, &headers);
    let info = state.oauth.userinfo(token, &issuer).await?;
    Ok(Json(info))
}
