use service_core::{
    axum::{
        extract::{Query, State},
        Json,
    },
    error::AppError,
};

use crate::dtos::{
    admin::{TokenSummary, TokensParams},
    ErrorResponse,
};
use crate::models::split_owner_name;
use crate::AppState;

/// Tokens issued to a user through an application
#[utoipa::path(
    get,
    path = "/api/get-tokens",
    params(TokensParams),
    responses(
        (status = 200, description = "Token records, newest first, without token values", body = [TokenSummary]),
        (status = 400, description = "Missing application or malformed user_id", body = ErrorResponse),
        (status = 403, description = "Denied by policy", body = ErrorResponse)
    ),
    tag = "Tokens",
    security(
        ("bearer_auth" = []),
        ("client_basic" = [])
    )
)]
pub async fn get_tokens(
    State(state): State<AppState>,
    Query(params): Query<TokensParams>,
) -> Result<Json<Vec<TokenSummary>>, AppError> {
    if params.application.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("application is required")));
    }
    let (organization, user) = split_owner_name(&params.user_id).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("user_id must be of the form <organization>/<user>"))
    })?;

    let tokens = state
        .oauth
        .list_tokens(&params.application, organization, user)
        .await
        .map_err(|e| AppError::StorageError(anyhow::Error::new(e)))?;
    Ok(Json(tokens))
}
