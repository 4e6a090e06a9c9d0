use service_core::{
    axum::{
        extract::{Request, State},
        http::HeaderMap,
        middleware::Next,
        response::IntoResponse,
    },
    error::AppError,
};
use std::collections::HashMap;

use crate::models::split_owner_name;
use crate::services::{metrics, policy::ANONYMOUS, PolicyRequest};
use crate::utils::{basic_credentials, bearer_token};
use crate::AppState;

/// Subject owner used for requests authenticated as an application.
pub const APP_OWNER: &str = "app";

/// Who is calling, as seen by the policy matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub owner: String,
    pub name: String,
}

impl Subject {
    pub fn anonymous() -> Self {
        Self {
            owner: ANONYMOUS.to_string(),
            name: ANONYMOUS.to_string(),
        }
    }

    fn application(name: String) -> Self {
        Self {
            owner: APP_OWNER.to_string(),
            name,
        }
    }
}

fn query_map(req: &Request) -> HashMap<String, String> {
    req.uri()
        .query()
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default()
}

/// `owner/name` from `id` or `user_id`, else the `owner` and `name` params.
fn request_object(query: &HashMap<String, String>) -> (String, String) {
    let id = query
        .get("id")
        .or_else(|| query.get("user_id"))
        .map(String::as_str)
        .unwrap_or_default();
    if let Some((owner, name)) = split_owner_name(id) {
        return (owner.to_string(), name.to_string());
    }

    let field = |key: &str| query.get(key).cloned().unwrap_or_default();
    (field("owner"), field("name"))
}

/// Object handed to the matcher. Anonymous callers never address an object,
/// so a query naming `anonymous/anonymous` cannot pass as self-access.
fn policy_object(subject: &Subject, query: &HashMap<String, String>) -> (String, String) {
    if subject.name == ANONYMOUS {
        return (String::new(), String::new());
    }
    request_object(query)
}

async fn request_subject(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Subject, AppError> {
    let client = basic_credentials(headers).or_else(|| {
        match (query.get("client_id"), query.get("client_secret")) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.clone(), secret.clone()))
            }
            _ => None,
        }
    });
    if let Some((client_id, client_secret)) = client {
        if let Some(app) = state.oauth.authenticate_client(&client_id, &client_secret).await {
            return Ok(Subject::application(app.name));
        }
    }

    if let Some(token) = bearer_token(headers) {
        let record = state.oauth.resolve_bearer(token).await.map_err(|e| {
            tracing::error!(error = %e, "Bearer token lookup failed");
            AppError::StorageError(anyhow::Error::new(e))
        })?;
        if let Some(record) = record {
            if record.user.is_empty() {
                return Ok(Subject::application(record.application));
            }
            return Ok(Subject {
                owner: record.organization,
                name: record.user,
            });
        }
    }

    Ok(Subject::anonymous())
}

/// Gate every request on the policy table. The resolved [`Subject`] is
/// stored in the request extensions.
pub async fn authz_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AppError> {
    let query = query_map(&req);
    let subject = request_subject(&state, req.headers(), &query).await?;
    let (obj_owner, obj_name) = policy_object(&subject, &query);

    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let allowed = state.policy.is_allowed(&PolicyRequest {
        sub_owner: &subject.owner,
        sub_name: &subject.name,
        method: &method,
        url_path: &path,
        obj_owner: &obj_owner,
        obj_name: &obj_name,
    });
    metrics::record_policy_decision(allowed);

    if !allowed {
        tracing::warn!(
            subject = %format!("{}/{}", subject.owner, subject.name),
            method = %method,
            path = %path,
            "Request denied by policy"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!("Unauthorized operation")));
    }

    req.extensions_mut().insert(subject);
    Ok(next.run(req).await)
}
