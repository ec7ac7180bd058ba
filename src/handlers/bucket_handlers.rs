//! HTTP handlers for bucket management under `/api/v1/buckets`.

use crate::{errors::AppError, models::bucket::BucketRecord, services::SharedStorage};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/buckets`.
#[derive(Debug, Deserialize)]
pub struct CreateBucketReq {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct BucketList {
    pub buckets: Vec<BucketRecord>,
    pub total: usize,
}

/// POST `/api/v1/buckets` — create bucket.
pub async fn create_bucket(
    State(storage): State<SharedStorage>,
    Json(payload): Json<CreateBucketReq>,
) -> Result<impl IntoResponse, AppError> {
    validate_new_bucket_name(&payload.name)?;
    let record = storage.create_bucket(&payload.name).await?;
    tracing::info!("created bucket `{}`", record.name);
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET `/api/v1/buckets` — every bucket with its statistics.
pub async fn list_buckets(
    State(storage): State<SharedStorage>,
) -> Result<Json<BucketList>, AppError> {
    let buckets = storage.list_buckets().await?;
    Ok(Json(BucketList {
        total: buckets.len(),
        buckets,
    }))
}

/// GET `/api/v1/buckets/{bucket}`
pub async fn get_bucket(
    State(storage): State<SharedStorage>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketRecord>, AppError> {
    Ok(Json(storage.bucket_info(&bucket).await?))
}

/// DELETE `/api/v1/buckets/{bucket}` — only empty buckets can be deleted.
pub async fn delete_bucket(
    State(storage): State<SharedStorage>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    storage.delete_bucket(&bucket).await?;
    tracing::info!("deleted bucket `{}`", bucket);
    Ok(StatusCode::NO_CONTENT)
}

/// Request-level naming rules, stricter than what the storage layer accepts.
fn validate_new_bucket_name(name: &str) -> Result<(), AppError> {
    let len = name.chars().count();
    if !(3..=63).contains(&len) {
        return Err(AppError::validation(
            "bucket name must be between 3 and 63 characters",
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::validation(
            "bucket name may only contain letters, digits, '-' and '_'",
        ));
    }
    if name.starts_with('-') || name.starts_with('_') {
        return Err(AppError::validation(
            "bucket name must start with a letter or digit",
        ));
    }
    Ok(())
}
