//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of a single object, assembled from the filesystem on each query.
///
/// The file on disk is the source of truth; this value is never cached.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Canonical name of the owning bucket.
    pub bucket: String,

    /// Size in bytes.
    pub size: u64,

    /// Content type (MIME type).
    pub content_type: String,

    /// Hex MD5 of the content, used as the ETag.
    pub etag: String,

    /// Modification time of the file.
    pub last_modified: DateTime<Utc>,
}

/// Response body of a successful upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectUploadRecord {
    pub key: String,
    pub bucket: String,
    pub size: u64,
    pub etag: String,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<ObjectMetadata> for ObjectUploadRecord {
    fn from(meta: ObjectMetadata) -> Self {
        Self {
            key: meta.key,
            bucket: meta.bucket,
            size: meta.size,
            etag: meta.etag,
            content_type: meta.content_type,
            uploaded_at: meta.last_modified,
        }
    }
}
