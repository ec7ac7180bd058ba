//! Derives object metadata from filesystem state.
//!
//! Nothing is cached: size and modification time come from `stat`, the
//! content type is guessed from the file name and the ETag is recomputed by
//! reading the whole file. Metadata queries therefore cost O(object size).

use super::{
    digest::DigestComputer,
    storage_service::{StorageError, StorageResult},
    walk::is_missing,
};
use crate::models::object::ObjectMetadata;
use chrono::{DateTime, Utc};
use std::{fs::Metadata, path::Path};
use tokio::{fs, io::AsyncReadExt};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Best-effort MIME type from a file name or key, falling back to
/// `application/octet-stream`.
pub fn guess_content_type(name: impl AsRef<Path>) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

#[derive(Debug, Clone)]
pub struct MetadataProvider {
    chunk_size: usize,
}

impl MetadataProvider {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Assemble metadata for an existing object, hashing its full content.
    pub async fn describe(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<ObjectMetadata> {
        let stat = self.stat(bucket, key, path).await?;
        let etag = self.digest_file(bucket, key, path).await?;
        Ok(ObjectMetadata {
            key: key.to_string(),
            bucket: bucket.to_string(),
            size: stat.len(),
            content_type: guess_content_type(path),
            etag,
            last_modified: modified_at(&stat, path)?,
        })
    }

    /// Assemble metadata for an object that was just written, reusing the
    /// size and digest computed while streaming.
    pub async fn describe_written(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: String,
        size: u64,
        etag: String,
    ) -> StorageResult<ObjectMetadata> {
        let stat = self.stat(bucket, key, path).await?;
        Ok(ObjectMetadata {
            key: key.to_string(),
            bucket: bucket.to_string(),
            size,
            content_type,
            etag,
            last_modified: modified_at(&stat, path)?,
        })
    }

    async fn stat(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<Metadata> {
        match fs::metadata(path).await {
            Ok(stat) if stat.is_file() => Ok(stat),
            Ok(_) => Err(not_found(bucket, key)),
            Err(err) if is_missing(&err) => Err(not_found(bucket, key)),
            Err(err) => Err(StorageError::io("reading metadata of", path)(err)),
        }
    }

    async fn digest_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<String> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(err) if is_missing(&err) => return Err(not_found(bucket, key)),
            Err(err) => return Err(StorageError::io("opening", path)(err)),
        };

        let mut digest = DigestComputer::new();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let read = file
                .read(&mut buf)
                .await
                .map_err(StorageError::io("hashing", path))?;
            if read == 0 {
                break;
            }
            digest.update(&buf[..read]);
        }
        Ok(digest.finalize())
    }
}

fn not_found(bucket: &str, key: &str) -> StorageError {
    StorageError::ObjectNotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

fn modified_at(stat: &Metadata, path: &Path) -> StorageResult<DateTime<Utc>> {
    stat.modified()
        .map(DateTime::<Utc>::from)
        .map_err(StorageError::io("reading modification time of", path))
}
