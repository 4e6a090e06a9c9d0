//! OAuth 2.0 endpoints: code issuance, token grants, logout and introspection.

use service_core::axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::request_issuer;
use crate::dtos::{
    oauth::{
        CodeParams, CodeResponse, IntrospectRequest, IntrospectResponse, LogoutParams,
        StatusResponse, TokenRequest, TokenResponse,
    },
    ErrorResponse, OAuthErrorResponse,
};
use crate::models::application::GRANT_REFRESH_TOKEN;
use crate::services::{LogoutOutcome, OAuthError};
use crate::utils::{basic_credentials, OAuthParams};
use crate::AppState;

/// Take client credentials from an `Authorization: Basic` header when the
/// body carries neither. The two sources are never mixed.
fn with_basic_credentials(mut req: TokenRequest, headers: &HeaderMap) -> TokenRequest {
    if !req.client_id.is_empty() || !req.client_secret.is_empty() {
        return req;
    }
    if let Some((client_id, client_secret)) = basic_credentials(headers) {
        req.client_id = client_id;
        req.client_secret = client_secret;
    }
    req
}

/// Issue an authorization code for a signed-in user
#[utoipa::path(
    post,
    path = "/login/oauth/code",
    params(CodeParams),
    responses(
        (status = 200, description = "Authorization code issued", body = CodeResponse),
        (status = 400, description = "Invalid request", body = OAuthErrorResponse),
        (status = 401, description = "Unknown client or user", body = OAuthErrorResponse),
        (status = 403, description = "Denied by policy", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn issue_code(
    State(state): State<AppState>,
    OAuthParams(params): OAuthParams<CodeParams>,
) -> Result<Json<CodeResponse>, OAuthError> {
    let code = state.oauth.issue_code(&params).await?;
    Ok(Json(CodeResponse {
        code: code.code,
        state: params.state,
    }))
}

/// Exchange a grant for tokens
#[utoipa::path(
    post,
    path = "/login/oauth/access_token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid request or unsupported grant type", body = OAuthErrorResponse),
        (status = 401, description = "Invalid client or grant", body = OAuthErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = OAuthErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn access_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    OAuthParams(req): OAuthParams<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let issuer = request_issuer(&state, &headers);
    let req = with_basic_credentials(req, &headers);
    let response = state.oauth.exchange(req, &issuer).await?;
    Ok(Json(response))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/login/oauth/refresh_token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 401, description = "Invalid client or refresh token", body = OAuthErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    OAuthParams(mut req): OAuthParams<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let issuer = request_issuer(&state, &headers);
    req.grant_type = GRANT_REFRESH_TOKEN.to_string();
    let req = with_basic_credentials(req, &headers);
    let response = state.oauth.exchange(req, &issuer).await?;
    Ok(Json(response))
}

/// Revoke the token named by `id_token_hint`
#[utoipa::path(
    get,
    path = "/login/oauth/logout",
    params(LogoutParams),
    responses(
        (status = 200, description = "Token revoked; data is true when it was active", body = StatusResponse),
        (status = 302, description = "Redirect to post_logout_redirect_uri"),
        (status = 400, description = "Missing id_token_hint", body = OAuthErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn logout(
    State(state): State<AppState>,
    OAuthParams(params): OAuthParams<LogoutParams>,
) -> Result<Response, OAuthError> {
    match state.oauth.logout(&params).await? {
        LogoutOutcome::Redirect(location) => {
            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
        LogoutOutcome::Revoked(was_active) => {
            Ok(Json(StatusResponse::ok(was_active)).into_response())
        }
    }
}

/// Token introspection (RFC 7662)
#[utoipa::path(
    post,
    path = "/login/oauth/introspect",
    request_body(content = IntrospectRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token status", body = IntrospectResponse),
        (status = 400, description = "Missing client credentials", body = OAuthErrorResponse),
        (status = 401, description = "Invalid client", body = OAuthErrorResponse)
    ),
    tag = "OAuth",
    security(
        ("client_basic" = [])
    )
)]
pub async fn introspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    OAuthParams(req): OAuthParams<IntrospectRequest>,
) -> Result<Json<IntrospectResponse>, OAuthError> {
    let response = state
        .oauth
        .introspect(&req, basic_credentials(&headers))
        .await?;
    Ok(Json(response))
}
