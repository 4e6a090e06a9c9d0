use service_core::axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};

use super::request_issuer;
use crate::services::discovery::{discovery_document, json_web_key_set, JwkSet, OidcDiscovery};
use crate::AppState;

/// OpenID Connect discovery document
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    responses(
        (status = 200, description = "Discovery document", body = OidcDiscovery)
    ),
    tag = "Well-Known"
)]
pub async fn openid_configuration(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<OidcDiscovery> {
    Json(discovery_document(&request_issuer(&state, &headers)))
}

/// Get JSON Web Key Set (JWKS)
#[utoipa::path(
    get,
    path = "/.well-known/jwks",
    responses(
        (status = 200, description = "Public keys of every signing certificate", body = JwkSet)
    ),
    tag = "Well-Known"
)]
pub async fn jwks(State(state): State<AppState>) -> impl IntoResponse {
    let jwks = json_web_key_set(&state.store).await;
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(jwks),
    )
}
