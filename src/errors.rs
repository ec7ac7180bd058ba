use crate::services::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for errors returned by HTTP handlers.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, error code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidRequest", msg)
    }

    /// Shortcut for 422 Unprocessable Entity
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "ValidationError", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath(_) => {
                AppError::bad_request("Invalid or unsafe path detected")
            }
            StorageError::BucketNotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "NoSuchBucket", err.to_string())
            }
            StorageError::ObjectNotFound { .. } => {
                AppError::new(StatusCode::NOT_FOUND, "NoSuchKey", err.to_string())
            }
            StorageError::BucketAlreadyExists(_) => AppError::new(
                StatusCode::CONFLICT,
                "BucketAlreadyOwnedByYou",
                err.to_string(),
            ),
            StorageError::BucketNotEmpty(_) => {
                AppError::new(StatusCode::CONFLICT, "BucketNotEmpty", err.to_string())
            }
            StorageError::FileSizeLimitExceeded { .. } => AppError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "EntityTooLarge",
                err.to_string(),
            ),
            StorageError::UnsupportedBackend(_) | StorageError::Io { .. } => {
                tracing::error!("storage failure: {}", err);
                AppError::internal("internal storage error")
            }
        }
    }
}
