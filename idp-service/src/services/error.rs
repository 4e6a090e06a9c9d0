use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use thiserror::Error;

use crate::utils::PasswordError;

/// Failures of the object and token stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(StoreError::Conflict(what)) => {
                AppError::Conflict(anyhow::anyhow!("{} already exists", what))
            }
            ServiceError::Store(StoreError::NotFound(what)) => {
                AppError::NotFound(anyhow::anyhow!("{} not found", what))
            }
            ServiceError::Store(StoreError::Invalid(msg)) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Store(StoreError::Redis(e)) => AppError::RedisError(e),
            ServiceError::Store(e) => AppError::StorageError(anyhow::Error::new(e)),
            ServiceError::Password(e) => AppError::ConfigError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::BadRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
        }
    }
}

/// RFC 6749 error codes used by the OAuth endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
    ServerError,
}

impl OAuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthErrorCode::InvalidRequest => "invalid_request",
            OAuthErrorCode::InvalidClient => "invalid_client",
            OAuthErrorCode::InvalidGrant => "invalid_grant",
            OAuthErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            OAuthErrorCode::ServerError => "server_error",
        }
    }

    /// The HTTP status is a function of the code alone.
    pub fn status(&self) -> StatusCode {
        match self {
            OAuthErrorCode::InvalidRequest | OAuthErrorCode::UnsupportedGrantType => {
                StatusCode::BAD_REQUEST
            }
            OAuthErrorCode::InvalidClient | OAuthErrorCode::InvalidGrant => {
                StatusCode::UNAUTHORIZED
            }
            OAuthErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {description}")]
pub struct OAuthError {
    pub code: OAuthErrorCode,
    pub description: String,
}

impl OAuthError {
    pub fn new(code: OAuthErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidRequest, description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidClient, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidGrant, description)
    }

    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::UnsupportedGrantType, description)
    }

    /// Fatal failure. Details go to the log, the client sees a generic message.
    pub fn server_error(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "OAuth request failed");
        Self::new(OAuthErrorCode::ServerError, "internal server error")
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        OAuthError::server_error(err)
    }
}

#[derive(Serialize)]
struct OAuthErrorBody<'a> {
    error: &'a str,
    error_description: &'a str,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        crate::services::metrics::record_oauth_error(self.code.as_str());

        (
            self.code.status(),
            [(header::CACHE_CONTROL, "no-store")],
            Json(OAuthErrorBody {
                error: self.code.as_str(),
                error_description: &self.description,
            }),
        )
            .into_response()
    }
}
