use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderMap},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::services::error::OAuthError;

/// Parameters of an OAuth endpoint, merged from the query string and the body.
///
/// The body may be `application/x-www-form-urlencoded` or JSON; body values win
/// over query values with the same name.
pub struct OAuthParams<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for OAuthParams<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = OAuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut fields = Map::new();

        if let Some(query) = req.uri().query() {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
                .map_err(|e| OAuthError::invalid_request(format!("malformed query: {}", e)))?;
            for (key, value) in pairs {
                fields.insert(key, Value::String(value));
            }
        }

        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| OAuthError::invalid_request(format!("unreadable body: {}", e)))?;

        if !body.is_empty() {
            if is_json {
                let value: Value = serde_json::from_slice(&body)
                    .map_err(|e| OAuthError::invalid_request(format!("Json parse error: {}", e)))?;
                match value {
                    Value::Object(map) => {
                        for (key, value) in map {
                            fields.insert(key, stringify(value));
                        }
                    }
                    _ => return Err(OAuthError::invalid_request("JSON body must be an object")),
                }
            } else {
                let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&body)
                    .map_err(|e| OAuthError::invalid_request(format!("malformed form body: {}", e)))?;
                for (key, value) in pairs {
                    fields.insert(key, Value::String(value));
                }
            }
        }

        serde_json::from_value(Value::Object(fields))
            .map(OAuthParams)
            .map_err(|e| OAuthError::invalid_request(format!("invalid parameters: {}", e)))
    }
}

fn stringify(value: Value) -> Value {
    match value {
        Value::String(_) => value,
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

/// Client id and secret from an `Authorization: Basic` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

/// Token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
