//! HTTP handlers for object operations under `/api/v1/objects`.
//! Object bodies are streamed in both directions; nothing is buffered whole.

use crate::{
    errors::AppError,
    models::object::{ObjectMetadata, ObjectUploadRecord},
    services::{ObjectUpload, SharedStorage},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::ReaderStream;

#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ObjectList {
    pub bucket: String,
    pub objects: Vec<ObjectMetadata>,
    pub total: usize,
    pub prefix: Option<String>,
}

/// POST `/api/v1/objects/{bucket}` — multipart upload.
///
/// Text fields `key` and `content_type` must precede the single `file` part.
/// The key falls back to the part's filename. A late text field or a second
/// `file` part rejects the whole request and removes what was stored.
pub async fn upload_multipart(
    State(storage): State<SharedStorage>,
    Path(bucket): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut key: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut stored: Option<ObjectMetadata> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                discard(&storage, stored.take()).await;
                return Err(AppError::bad_request(format!(
                    "malformed multipart body: {}",
                    err
                )));
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("key" | "content_type" | "file") if stored.is_some() => {
                discard(&storage, stored.take()).await;
                return Err(AppError::validation(
                    "`key` and `content_type` must precede a single `file` part",
                ));
            }
            Some("key") => key = Some(read_text(field).await?).filter(|k| !k.is_empty()),
            Some("content_type") => {
                content_type = Some(read_text(field).await?).filter(|ct| !ct.is_empty())
            }
            Some("file") => {
                let object_key = key
                    .take()
                    .or_else(|| field.file_name().map(str::to_string))
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        AppError::validation("either a `key` field or a filename is required")
                    })?;
                let declared = field.content_type().map(str::to_string);
                let body = field.map(|chunk| chunk.map_err(io::Error::other));
                let upload = ObjectUpload::new(body)
                    .with_declared_content_type(declared)
                    .with_content_type_override(content_type.take());

                stored = Some(storage.put_object(&bucket, &object_key, upload).await?);
            }
            _ => tracing::debug!("ignoring multipart field {:?}", name),
        }
    }

    stored
        .map(upload_response)
        .ok_or_else(|| AppError::validation("multipart body has no `file` part"))
}

/// PUT `/api/v1/objects/{bucket}/{*key}` — raw body upload.
pub async fn upload_object(
    State(storage): State<SharedStorage>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let size_hint = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));
    let upload = ObjectUpload::new(stream)
        .with_declared_content_type(content_type)
        .with_size_hint(size_hint);

    let meta = storage.put_object(&bucket, &key, upload).await?;
    Ok(upload_response(meta))
}

/// GET `/api/v1/objects/{bucket}` — list objects, supports `?prefix=`.
pub async fn list_objects(
    State(storage): State<SharedStorage>,
    Path(bucket): Path<String>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Json<ObjectList>, AppError> {
    let objects = storage.list_objects(&bucket, q.prefix.as_deref()).await?;
    Ok(Json(ObjectList {
        bucket,
        total: objects.len(),
        objects,
        prefix: q.prefix,
    }))
}

/// GET `/api/v1/objects/{bucket}/{*key}` as a streaming download.
pub async fn get_object(
    State(storage): State<SharedStorage>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let reader = storage.get_object(&bucket, &key).await?;
    let stream = ReaderStream::with_capacity(reader.file, storage.chunk_size());

    let mut response = Response::new(Body::from_stream(stream));
    set_object_headers(response.headers_mut(), &reader.metadata);
    Ok(response)
}

/// HEAD `/api/v1/objects/{bucket}/{*key}` — same headers as GET but no body.
pub async fn head_object(
    State(storage): State<SharedStorage>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let meta = storage.head_object(&bucket, &key).await?;
    let mut response = Response::new(Body::empty());
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// DELETE `/api/v1/objects/{bucket}/{*key}`
pub async fn delete_object(
    State(storage): State<SharedStorage>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    storage.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("unreadable multipart field: {}", err)))
}

/// Best-effort removal of an object stored by a request that is then refused.
async fn discard(storage: &SharedStorage, stored: Option<ObjectMetadata>) {
    let Some(meta) = stored else { return };
    if let Err(err) = storage.delete_object(&meta.bucket, &meta.key).await {
        tracing::warn!(
            "could not remove `{}/{}` after a refused upload: {}",
            meta.bucket,
            meta.key,
            err
        );
    }
}

fn upload_response(meta: ObjectMetadata) -> Response {
    tracing::info!(
        "stored `{}/{}` ({} bytes, etag {})",
        meta.bucket,
        meta.key,
        meta.size,
        meta.etag
    );
    let etag = format!("\"{}\"", meta.etag);
    let mut response = (StatusCode::CREATED, Json(ObjectUploadRecord::from(meta))).into_response();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMetadata) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }

    let last_modified = meta
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    // Non-ASCII filenames can't be carried in a plain header value; skip it.
    let filename = meta.key.rsplit('/').next().unwrap_or(&meta.key);
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "\\\""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}
