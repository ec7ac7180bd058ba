//! Represents a bucket: a top-level directory under the storage root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bucket and its statistics.
///
/// Nothing here is persisted. Every field is derived from the bucket
/// directory when the record is built.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BucketRecord {
    /// Canonical lowercase bucket name (also the directory name).
    pub name: String,

    /// Creation time of the bucket directory.
    pub created_at: DateTime<Utc>,

    /// Number of regular files anywhere in the bucket subtree.
    pub object_count: u64,

    /// Sum of the sizes of those files, in bytes.
    pub total_size: u64,
}
