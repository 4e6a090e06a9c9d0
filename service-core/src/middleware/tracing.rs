use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Caller-supplied ids are kept only when short and printable; anything else
/// is replaced so log lines stay parseable.
fn accepted_request_id(value: Option<&HeaderValue>) -> Option<String> {
    let id = value?.to_str().ok()?.trim();
    if id.is_empty() || id.len() > MAX_REQUEST_ID_LEN {
        return None;
    }
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        .then(|| id.to_string())
}

/// Propagate `x-request-id` from request to response, generating a UUID when
/// the caller sent none or an unusable one.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = accepted_request_id(req.headers().get(REQUEST_ID_HEADER))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let Ok(header_value) = HeaderValue::from_str(&request_id) else {
        return next.run(req).await;
    };
    req.headers_mut()
        .insert(REQUEST_ID_HEADER, header_value.clone());

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, header_value);
    response
}
