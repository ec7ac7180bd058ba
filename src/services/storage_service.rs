//! src/services/storage_service.rs
//!
//! The storage capability seen by the HTTP layer and its local filesystem
//! implementation. Buckets are directories directly under the storage root
//! and objects are files below them at `root/{bucket}/{key}`. There is no
//! metadata database; everything is derived from the filesystem on demand.

use super::{
    bucket_manager::BucketManager,
    object_store::{ObjectReader, ObjectStore, ObjectUpload},
    path_resolver::PathResolver,
};
use crate::{
    config::StorageConfig,
    models::{bucket::BucketRecord, object::ObjectMetadata},
};
use async_trait::async_trait;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid or unsafe path `{0}`")]
    InvalidPath(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("file size {size} bytes exceeds maximum allowed size {limit} bytes")]
    FileSizeLimitExceeded { size: u64, limit: u64 },
    #[error("storage backend `{0}` is not supported")]
    UnsupportedBackend(String),
    #[error("storage failure while {action} `{}`: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Wrap an `io::Error` raised while performing `action` on `path`.
    ///
    /// Meant for `map_err`: `fs::remove_file(&p).await.map_err(StorageError::io("removing", &p))`.
    pub fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> StorageError {
        let path = path.to_path_buf();
        move |source| StorageError::Io {
            action,
            path,
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The backend instance shared by every request handler.
pub type SharedStorage = Arc<dyn StorageBackend>;

/// Operations every storage backend offers to the request-handling layer.
///
/// Names and keys arrive exactly as the client sent them; implementations
/// validate and sandbox them. Errors are domain outcomes, never transport
/// statuses.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short identifier reported by health checks.
    fn name(&self) -> &'static str;

    /// Preferred chunk size for streaming object bodies.
    fn chunk_size(&self) -> usize;

    async fn create_bucket(&self, name: &str) -> StorageResult<BucketRecord>;

    /// Delete a bucket that holds no objects.
    async fn delete_bucket(&self, name: &str) -> StorageResult<()>;

    async fn list_buckets(&self) -> StorageResult<Vec<BucketRecord>>;

    async fn bucket_exists(&self, name: &str) -> StorageResult<bool>;

    async fn bucket_info(&self, name: &str) -> StorageResult<BucketRecord>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        upload: ObjectUpload<'_>,
    ) -> StorageResult<ObjectMetadata>;

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader>;

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectMetadata>>;

    /// Readiness check against the underlying storage.
    async fn probe(&self) -> StorageResult<()>;
}

/// Construct the backend named by `backend`.
pub async fn build_backend(config: &StorageConfig, backend: &str) -> StorageResult<SharedStorage> {
    match backend.to_ascii_lowercase().as_str() {
        "local" => Ok(Arc::new(LocalFilesystemBackend::open(config).await?)),
        other => Err(StorageError::UnsupportedBackend(other.to_string())),
    }
}

/// Storage backend keeping buckets and objects in a local directory tree.
#[derive(Clone, Debug)]
pub struct LocalFilesystemBackend {
    root: PathBuf,
    chunk_size: usize,
    buckets: BucketManager,
    objects: ObjectStore,
}

impl LocalFilesystemBackend {
    /// Create the storage root if needed and build the backend over its
    /// canonical path.
    pub async fn open(config: &StorageConfig) -> StorageResult<Self> {
        fs::create_dir_all(&config.storage_dir)
            .await
            .map_err(StorageError::io("creating storage root", &config.storage_dir))?;
        let root = fs::canonicalize(&config.storage_dir)
            .await
            .map_err(StorageError::io("canonicalizing storage root", &config.storage_dir))?;

        let resolver = PathResolver::new(root.clone(), config.path_traversal_protection);
        let buckets = BucketManager::new(resolver.clone());
        let objects = ObjectStore::new(
            resolver,
            buckets.clone(),
            config.max_file_size,
            config.chunk_size,
        );

        tracing::debug!("opened local storage at {}", root.display());
        Ok(Self {
            root,
            chunk_size: config.chunk_size,
            buckets,
            objects,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageBackend for LocalFilesystemBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn create_bucket(&self, name: &str) -> StorageResult<BucketRecord> {
        self.buckets.create(name).await
    }

    async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        self.buckets.delete(name).await
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketRecord>> {
        self.buckets.list().await
    }

    async fn bucket_exists(&self, name: &str) -> StorageResult<bool> {
        self.buckets.exists(name).await
    }

    async fn bucket_info(&self, name: &str) -> StorageResult<BucketRecord> {
        self.buckets.info(name).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        upload: ObjectUpload<'_>,
    ) -> StorageResult<ObjectMetadata> {
        self.objects.put(bucket, key, upload).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader> {
        self.objects.get(bucket, key).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        self.objects.head(bucket, key).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.objects.delete(bucket, key).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectMetadata>> {
        self.objects.list(bucket, prefix).await
    }

    /// Write, read back and remove a scratch file directly under the root.
    async fn probe(&self) -> StorageResult<()> {
        let tmp_path = self.root.join(format!(".probe-{}", Uuid::new_v4()));
        let payload = b"probe";

        let outcome = async {
            fs::write(&tmp_path, payload)
                .await
                .map_err(StorageError::io("writing probe file", &tmp_path))?;
            let read_back = fs::read(&tmp_path)
                .await
                .map_err(StorageError::io("reading probe file", &tmp_path))?;
            if read_back != payload {
                return Err(StorageError::Io {
                    action: "verifying probe file",
                    path: tmp_path.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidData, "content mismatch"),
                });
            }
            Ok(())
        }
        .await;

        if let Err(err) = fs::remove_file(&tmp_path).await {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!("could not remove probe file {}: {}", tmp_path.display(), err);
            }
        }
        outcome
    }
}
