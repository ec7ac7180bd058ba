//! Drives the full router in-process with `tower::ServiceExt::oneshot`.

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use disk_object_store::{config::StorageConfig, routes::routes::app, services::build_backend};
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

async fn test_app(max_file_size: u64) -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let mut config = StorageConfig::new(dir.path().join("objects"));
    config.max_file_size = max_file_size;
    let storage = build_backend(&config, "local").await.unwrap();
    (dir, app(storage, &["*".to_string()]))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn create_bucket_request(name: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/buckets")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": name }).to_string()))
        .unwrap()
}

fn put_request(uri: &str, content_type: &str, data: &'static [u8]) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(data))
        .unwrap()
}

#[tokio::test]
async fn health_reports_backend_and_version() {
    let (_dir, app) = test_app(1024).await;

    for uri in ["/", "/health"] {
        let (status, _, body) = send(&app, request(Method::GET, uri)).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage_backend"], "local");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    let (status, _, body) = send(&app, request(Method::GET, "/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "ok");
}

#[tokio::test]
async fn bucket_lifecycle() {
    let (_dir, app) = test_app(1024).await;

    let (status, _, body) = send(&app, create_bucket_request("Photos")).await;
    assert_eq!(status, StatusCode::CREATED);
    let created = json_body(&body);
    assert_eq!(created["name"], "photos");
    assert_eq!(created["object_count"], 0);

    let (status, _, body) = send(&app, create_bucket_request("photos")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json_body(&body)["code"], "BucketAlreadyOwnedByYou");

    let (status, _, body) = send(&app, create_bucket_request("ab")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(&body)["code"], "ValidationError");

    let (status, _, body) = send(&app, request(Method::GET, "/api/v1/buckets")).await;
    assert_eq!(status, StatusCode::OK);
    let listed = json_body(&body);
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["buckets"][0]["name"], "photos");

    let (status, _, _) = send(&app, request(Method::GET, "/api/v1/buckets/photos")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, request(Method::DELETE, "/api/v1/buckets/photos")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = send(&app, request(Method::GET, "/api/v1/buckets/photos")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["code"], "NoSuchBucket");
}

#[tokio::test]
async fn raw_upload_download_and_delete() {
    let (_dir, app) = test_app(1024).await;
    send(&app, create_bucket_request("docs")).await;

    let (status, headers, body) = send(
        &app,
        put_request("/api/v1/objects/docs/notes/today.txt", "text/plain", b"meow"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let uploaded = json_body(&body);
    assert_eq!(uploaded["key"], "notes/today.txt");
    assert_eq!(uploaded["bucket"], "docs");
    assert_eq!(uploaded["size"], 4);
    assert_eq!(uploaded["content_type"], "text/plain");
    let etag = uploaded["etag"].as_str().unwrap().to_string();
    assert_eq!(headers[header::ETAG], format!("\"{}\"", etag).as_str());

    let (status, headers, body) =
        send(&app, request(Method::GET, "/api/v1/objects/docs/notes/today.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"meow");
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(headers[header::CONTENT_LENGTH], "4");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"today.txt\""
    );
    assert!(headers.contains_key(header::LAST_MODIFIED));

    let (status, headers, body) =
        send(&app, request(Method::HEAD, "/api/v1/objects/docs/notes/today.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(headers[header::CONTENT_LENGTH], "4");
    assert_eq!(headers[header::ETAG], format!("\"{}\"", etag).as_str());

    let (status, _, body) =
        send(&app, request(Method::DELETE, "/api/v1/buckets/docs")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json_body(&body)["code"], "BucketNotEmpty");

    let (status, _, _) =
        send(&app, request(Method::DELETE, "/api/v1/objects/docs/notes/today.txt")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) =
        send(&app, request(Method::GET, "/api/v1/objects/docs/notes/today.txt")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["code"], "NoSuchKey");
}

#[tokio::test]
async fn multipart_upload_uses_key_field_or_filename() {
    let (_dir, app) = test_app(1024).await;
    send(&app, create_bucket_request("docs")).await;

    let boundary = "X-BOUNDARY";
    let multipart = |parts: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/objects/docs")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(parts.to_string()))
            .unwrap()
    };

    let with_key = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\nguides/readme.md\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload.md\"\r\n\
         Content-Type: text/markdown\r\n\r\n# hello\r\n--{b}--\r\n",
        b = boundary
    );
    let (status, _, body) = send(&app, multipart(&with_key)).await;
    assert_eq!(status, StatusCode::CREATED);
    let uploaded = json_body(&body);
    assert_eq!(uploaded["key"], "guides/readme.md");
    assert_eq!(uploaded["size"], 7);
    assert_eq!(uploaded["content_type"], "text/markdown");

    let filename_only = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\n\
         Content-Type: application/octet-stream\r\n\r\nPNGDATA\r\n--{b}--\r\n",
        b = boundary
    );
    let (status, _, body) = send(&app, multipart(&filename_only)).await;
    assert_eq!(status, StatusCode::CREATED);
    let uploaded = json_body(&body);
    assert_eq!(uploaded["key"], "photo.png");
    assert_eq!(uploaded["content_type"], "image/png");

    let no_file = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\nlonely\r\n--{b}--\r\n",
        b = boundary
    );
    let (status, _, _) = send(&app, multipart(&no_file)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let key_after_file = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"late.txt\"\r\n\r\n\
         late\r\n--{b}\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\n\
         guides/late.txt\r\n--{b}--\r\n",
        b = boundary
    );
    let (status, _, body) = send(&app, multipart(&key_after_file)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(&body)["code"], "ValidationError");
    let (status, _, _) = send(&app, request(Method::HEAD, "/api/v1/objects/docs/late.txt")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) =
        send(&app, request(Method::GET, "/api/v1/objects/docs?prefix=guides/")).await;
    assert_eq!(status, StatusCode::OK);
    let listed = json_body(&body);
    assert_eq!(listed["bucket"], "docs");
    assert_eq!(listed["prefix"], "guides/");
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["objects"][0]["key"], "guides/readme.md");
}

#[tokio::test]
async fn oversized_and_unsafe_requests_are_refused() {
    let (dir, app) = test_app(8).await;
    send(&app, create_bucket_request("docs")).await;

    let (status, _, body) = send(
        &app,
        put_request("/api/v1/objects/docs/big.bin", "application/octet-stream", b"0123456789"),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(&body)["code"], "EntityTooLarge");

    let (status, _, body) = send(
        &app,
        request(Method::GET, "/api/v1/objects/docs/..%2F..%2Fetc/passwd"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!String::from_utf8_lossy(&body).contains("passwd"));

    let (status, _, body) = send(&app, request(Method::GET, "/api/v1/objects/docs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["total"], 0);
    assert!(!dir.path().join("etc").exists());
}
