//! Defines routes for the bucket and object API.
//!
//! ## Structure
//! - **Health**
//!   - `GET    /`, `/health` — liveness
//!   - `GET    /readyz` — readiness (disk probe)
//!
//! - **Bucket-level endpoints**
//!   - `POST   /api/v1/buckets` — create bucket
//!   - `GET    /api/v1/buckets` — list buckets
//!   - `GET    /api/v1/buckets/{bucket}` — bucket statistics
//!   - `DELETE /api/v1/buckets/{bucket}` — delete an empty bucket
//!
//! - **Object-level endpoints**
//!   - `POST   /api/v1/objects/{bucket}` — multipart upload
//!   - `GET    /api/v1/objects/{bucket}` — list objects (supports `?prefix=`)
//!   - `PUT    /api/v1/objects/{bucket}/{*key}` — raw upload
//!   - `GET    /api/v1/objects/{bucket}/{*key}` — download object
//!   - `HEAD   /api/v1/objects/{bucket}/{*key}` — retrieve metadata only
//!   - `DELETE /api/v1/objects/{bucket}/{*key}` — delete object
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, get_bucket, list_buckets},
        health_handlers::{health, readyz},
        object_handlers::{
            delete_object, get_object, head_object, list_objects, upload_multipart,
            upload_object,
        },
    },
    services::SharedStorage,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router for all API routes, without state.
pub fn routes() -> Router<SharedStorage> {
    let buckets = Router::new()
        .route("/api/v1/buckets", get(list_buckets).post(create_bucket))
        .route("/api/v1/buckets/{bucket}", get(get_bucket).delete(delete_bucket));

    // Upload size is enforced by the storage layer while streaming.
    let objects = Router::new()
        .route(
            "/api/v1/objects/{bucket}",
            get(list_objects).post(upload_multipart),
        )
        .route(
            "/api/v1/objects/{bucket}/{*key}",
            get(get_object)
                .put(upload_object)
                .head(head_object)
                .delete(delete_object),
        )
        .layer(DefaultBodyLimit::disable());

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .merge(buckets)
        .merge(objects)
}

/// The complete application: routes, shared storage, CORS and request tracing.
pub fn app(storage: SharedStorage, allowed_origins: &[String]) -> Router {
    routes()
        .with_state(storage)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin `{}`", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
