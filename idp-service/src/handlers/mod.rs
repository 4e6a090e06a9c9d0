//! HTTP handlers for the identity provider.

pub mod metrics;
pub mod oauth;
pub mod organization;
pub mod tokens;
pub mod userinfo;
pub mod well_known;

use service_core::axum::http::{header, HeaderMap};

use crate::services::discovery::issuer_for;
use crate::AppState;

/// Issuer for this request: `ORIGIN` when configured, else the `Host` header.
pub(crate) fn request_issuer(state: &AppState, headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    issuer_for(state.config.origin.as_deref(), host)
}
