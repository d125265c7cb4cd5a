//! API errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use claimit_core::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing or invalid bearer token")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPath(_) | StoreError::InvalidDocument(_) => {
                ApiError::BadRequest(err.to_string())
            }
            StoreError::Serialization(e) => ApiError::BadRequest(e.to_string()),
            StoreError::NotFound(path) => ApiError::NotFound(path),
            StoreError::Unauthenticated => ApiError::Unauthenticated,
            StoreError::PermissionDenied(reason) => ApiError::Forbidden(reason),
            StoreError::FailedPrecondition(reason) => ApiError::Conflict(reason),
            StoreError::Unavailable(_) | StoreError::Backend(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(detail) = &self {
            error!("Request failed: {}", detail);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_status() {
        let cases = [
            (StoreError::InvalidPath("a/b/c/d/e/f".into()), StatusCode::BAD_REQUEST),
            (StoreError::NotFound("found_items/x".into()), StatusCode::NOT_FOUND),
            (StoreError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (StoreError::PermissionDenied("no".into()), StatusCode::FORBIDDEN),
            (
                StoreError::FailedPrecondition("found_items/i1 no longer exists".into()),
                StatusCode::CONFLICT,
            ),
            (StoreError::Backend("pool closed".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_detail_not_in_message() {
        let err = ApiError::Internal("password authentication failed".into());
        assert_eq!(err.to_string(), "Internal error");
    }
}
