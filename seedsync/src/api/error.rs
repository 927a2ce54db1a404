//! API error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::utils::errors::{AuthorizationError, InvalidPathError};
use crate::utils::SeedSyncError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<InvalidPathError> for ApiError {
    fn from(err: InvalidPathError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<SeedSyncError> for ApiError {
    fn from(err: SeedSyncError) -> Self {
        match err {
            SeedSyncError::ManifestBuild(e) => {
                tracing::error!("Cannot build manifest: {e}");
                ApiError::ServiceUnavailable("Root directory unavailable".into())
            }
            SeedSyncError::InvalidPath(e) => e.into(),
            SeedSyncError::Authorization(e) => e.into(),
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized".into()),
            ApiError::ServiceUnavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}
