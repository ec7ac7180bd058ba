//! Health & readiness handlers.
//!
//! - GET /, /health -> liveness with service version and backend name
//! - GET /readyz    -> readiness that exercises disk I/O on the storage root

use crate::services::SharedStorage;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// `GET /health`
///
/// Cheap liveness probe; never touches storage.
pub async fn health(State(storage): State<SharedStorage>) -> impl IntoResponse {
    Json(HealthCheck {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        storage_backend: storage.name(),
        timestamp: Utc::now(),
    })
}

/// `GET /readyz`
///
/// HTTP 200 when a scratch file can be written, read back and removed under
/// the storage root, HTTP 503 otherwise.
pub async fn readyz(State(storage): State<SharedStorage>) -> impl IntoResponse {
    match storage.probe().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ok",
                error: None,
            }),
        ),
        Err(err) => {
            tracing::warn!("readiness probe failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    status: "error",
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

#[derive(Serialize)]
struct HealthCheck {
    status: &'static str,
    version: &'static str,
    storage_backend: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}
