use service_core::{
    axum::{
        extract::{Query, State},
        Json,
    },
    error::AppError,
};

use crate::dtos::{admin::OrganizationParams, oauth::StatusResponse, ErrorResponse};
use crate::models::{split_owner_name, Organization};
use crate::services::ADMIN_OWNER;
use crate::AppState;

fn organization_name(id: &str) -> Result<&str, AppError> {
    match split_owner_name(id) {
        Some((ADMIN_OWNER, name)) => Ok(name),
        _ => Err(AppError::BadRequest(anyhow::anyhow!(
            "id must be of the form admin/<organization>"
        ))),
    }
}

/// List organizations
#[utoipa::path(
    get,
    path = "/api/get-organizations",
    responses(
        (status = 200, description = "Organizations, master passwords masked", body = [Organization]),
        (status = 403, description = "Denied by policy", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(
        ("bearer_auth" = []),
        ("client_basic" = [])
    )
)]
pub async fn get_organizations(State(state): State<AppState>) -> Json<Vec<Organization>> {
    Json(state.organizations.list().await)
}

/// Get one organization
#[utoipa::path(
    get,
    path = "/api/get-organization",
    params(OrganizationParams),
    responses(
        (status = 200, description = "Organization, master password masked", body = Organization),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 403, description = "Denied by policy", body = ErrorResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(
        ("bearer_auth" = []),
        ("client_basic" = [])
    )
)]
pub async fn get_organization(
    State(state): State<AppState>,
    Query(params): Query<OrganizationParams>,
) -> Result<Json<Organization>, AppError> {
    let name = organization_name(&params.id)?;
    state
        .organizations
        .get(name)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("organization {} not found", name)))
}

/// Update (or rename) an organization
#[utoipa::path(
    post,
    path = "/api/update-organization",
    params(OrganizationParams),
    request_body = Organization,
    responses(
        (status = 200, description = "Organization updated", body = StatusResponse),
        (status = 400, description = "Malformed id or password type", body = ErrorResponse),
        (status = 403, description = "Denied by policy, or renaming the built-in organization", body = ErrorResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse),
        (status = 409, description = "Target name already taken", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(
        ("bearer_auth" = []),
        ("client_basic" = [])
    )
)]
pub async fn update_organization(
    State(state): State<AppState>,
    Query(params): Query<OrganizationParams>,
    Json(update): Json<Organization>,
) -> Result<Json<StatusResponse>, AppError> {
    let name = organization_name(&params.id)?;
    state.organizations.update(name, update).await?;
    Ok(Json(StatusResponse::ok("Affected")))
}
