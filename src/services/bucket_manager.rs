//! Bucket lifecycle: one directory per bucket directly under the storage
//! root. Statistics are computed by walking the bucket subtree, so listing
//! is O(total files) and belongs on the management plane only.

use super::{
    path_resolver::{BucketPath, PathResolver},
    storage_service::{StorageError, StorageResult},
    walk::{FileWalker, is_missing},
};
use crate::models::bucket::BucketRecord;
use chrono::{DateTime, Utc};
use std::{
    fs::Metadata,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BucketManager {
    resolver: PathResolver,
}

impl BucketManager {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Create the bucket directory. Fails if anything already exists at that
    /// path.
    pub async fn create(&self, name: &str) -> StorageResult<BucketRecord> {
        let bucket = self.resolver.resolve_bucket_path(name).await?;
        match fs::create_dir(&bucket.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::BucketAlreadyExists(bucket.name));
            }
            Err(err) => return Err(StorageError::io("creating bucket", &bucket.path)(err)),
        }

        debug!("created bucket `{}` at {}", bucket.name, bucket.path.display());
        let stat = fs::metadata(&bucket.path)
            .await
            .map_err(StorageError::io("reading metadata of", &bucket.path))?;
        Ok(BucketRecord {
            name: bucket.name,
            created_at: created_at(&stat, &bucket.path)?,
            object_count: 0,
            total_size: 0,
        })
    }

    /// Delete a bucket whose subtree contains no files. Leftover empty
    /// directories are removed with it, deepest first, and only with
    /// `remove_dir`: anything written into the tree meanwhile makes the
    /// delete fail with `BucketNotEmpty` instead of being destroyed.
    pub async fn delete(&self, name: &str) -> StorageResult<()> {
        let bucket = self.require(name).await?;

        let first_file = FileWalker::new(&bucket.path)
            .next_file()
            .await
            .map_err(StorageError::io("scanning bucket", &bucket.path))?;
        if first_file.is_some() {
            return Err(StorageError::BucketNotEmpty(bucket.name));
        }

        let dirs = match empty_tree(&bucket.path).await {
            Ok(Some(dirs)) => dirs,
            Ok(None) => return Err(StorageError::BucketNotEmpty(bucket.name)),
            Err(err) if is_missing(&err) => return Err(StorageError::BucketNotFound(bucket.name)),
            Err(err) => return Err(StorageError::io("scanning bucket", &bucket.path)(err)),
        };

        for dir in dirs.iter().rev() {
            match fs::remove_dir(dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => {
                    debug!("bucket `{}` gained content while deleting", bucket.name);
                    return Err(StorageError::BucketNotEmpty(bucket.name));
                }
                Err(err) if is_missing(&err) && dir != &bucket.path => {}
                Err(err) if is_missing(&err) => {
                    return Err(StorageError::BucketNotFound(bucket.name));
                }
                Err(err) => return Err(StorageError::io("removing bucket", dir)(err)),
            }
        }
        debug!("deleted bucket `{}`", bucket.name);
        Ok(())
    }

    /// True iff the bucket directory exists. Invalid names are an error, not
    /// `false`.
    pub async fn exists(&self, name: &str) -> StorageResult<bool> {
        let bucket = self.resolver.resolve_bucket_path(name).await?;
        self.is_present(&bucket).await
    }

    /// Resolve `name` and fail with `BucketNotFound` unless it exists.
    pub async fn require(&self, name: &str) -> StorageResult<BucketPath> {
        let bucket = self.resolver.resolve_bucket_path(name).await?;
        self.ensure_present(&bucket).await?;
        Ok(bucket)
    }

    pub async fn ensure_present(&self, bucket: &BucketPath) -> StorageResult<()> {
        if self.is_present(bucket).await? {
            Ok(())
        } else {
            Err(StorageError::BucketNotFound(bucket.name.clone()))
        }
    }

    pub async fn info(&self, name: &str) -> StorageResult<BucketRecord> {
        let bucket = self.require(name).await?;
        self.summarize(&bucket.name, &bucket.path).await
    }

    /// Every directory directly under the storage root, sorted by name.
    pub async fn list(&self) -> StorageResult<Vec<BucketRecord>> {
        let root = self.resolver.root();
        let mut entries = fs::read_dir(root)
            .await
            .map_err(StorageError::io("listing storage root", root))?;

        let mut buckets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageError::io("listing storage root", root))?
        {
            let is_dir = match entry.file_type().await {
                Ok(file_type) => file_type.is_dir(),
                Err(err) if is_missing(&err) => continue,
                Err(err) => return Err(StorageError::io("inspecting", &entry.path())(err)),
            };
            if !is_dir {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("skipping non UTF-8 directory {}", entry.path().display());
                continue;
            };

            match self.summarize(&name, &entry.path()).await {
                Ok(record) => buckets.push(record),
                Err(StorageError::BucketNotFound(_)) => debug!("bucket `{}` vanished while listing", name),
                Err(err) => return Err(err),
            }
        }

        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn is_present(&self, bucket: &BucketPath) -> StorageResult<bool> {
        match fs::metadata(&bucket.path).await {
            Ok(stat) => Ok(stat.is_dir()),
            Err(err) if is_missing(&err) => Ok(false),
            Err(err) => Err(StorageError::io("checking bucket", &bucket.path)(err)),
        }
    }

    async fn summarize(&self, name: &str, path: &Path) -> StorageResult<BucketRecord> {
        let stat = match fs::metadata(path).await {
            Ok(stat) => stat,
            Err(err) if is_missing(&err) => return Err(StorageError::BucketNotFound(name.to_string())),
            Err(err) => return Err(StorageError::io("reading metadata of", path)(err)),
        };

        let mut walker = FileWalker::new(path);
        let mut object_count = 0u64;
        let mut total_size = 0u64;
        loop {
            match walker.next_file().await {
                Ok(Some(entry)) => {
                    object_count += 1;
                    total_size += entry.metadata.len();
                }
                Ok(None) => break,
                Err(err) if is_missing(&err) => {
                    return Err(StorageError::BucketNotFound(name.to_string()));
                }
                Err(err) => return Err(StorageError::io("walking bucket", path)(err)),
            }
        }

        Ok(BucketRecord {
            name: name.to_string(),
            created_at: created_at(&stat, path)?,
            object_count,
            total_size,
        })
    }
}

/// Every directory of the tree rooted at `root`, parents before children,
/// or `None` if anything other than a directory is found in it.
async fn empty_tree(root: &Path) -> io::Result<Option<Vec<PathBuf>>> {
    let mut dirs = vec![root.to_path_buf()];
    let mut next = 0;
    while next < dirs.len() {
        let mut entries = match fs::read_dir(&dirs[next]).await {
            Ok(entries) => entries,
            Err(err) if next > 0 && is_missing(&err) => {
                next += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        next += 1;
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => dirs.push(entry.path()),
                Ok(_) => return Ok(None),
                Err(err) if is_missing(&err) => {}
                Err(err) => return Err(err),
            }
        }
    }
    Ok(Some(dirs))
}

/// Directory birth time where the platform records one, else its mtime.
fn created_at(stat: &Metadata, path: &Path) -> StorageResult<DateTime<Utc>> {
    stat.created()
        .or_else(|_| stat.modified())
        .map(DateTime::<Utc>::from)
        .map_err(StorageError::io("reading timestamps of", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn manager() -> (TempDir, BucketManager) {
        let dir = tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        (dir, BucketManager::new(PathResolver::new(root, true)))
    }

    #[tokio::test]
    async fn create_then_exists() {
        let (dir, buckets) = manager();

        let record = buckets.create("Reports").await.unwrap();
        assert_eq!(record.name, "reports");
        assert_eq!((record.object_count, record.total_size), (0, 0));
        assert!(dir.path().join("reports").is_dir());

        assert!(buckets.exists("reports").await.unwrap());
        assert!(buckets.exists("REPORTS").await.unwrap());
        assert!(!buckets.exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let (_dir, buckets) = manager();
        buckets.create("dup").await.unwrap();
        assert!(matches!(
            buckets.create("DUP").await,
            Err(StorageError::BucketAlreadyExists(name)) if name == "dup"
        ));
    }

    #[tokio::test]
    async fn exists_propagates_invalid_names() {
        let (_dir, buckets) = manager();
        assert!(matches!(
            buckets.exists("../../../etc").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn delete_refuses_nested_files_but_ignores_empty_dirs() {
        let (dir, buckets) = manager();
        buckets.create("media").await.unwrap();
        std::fs::create_dir_all(dir.path().join("media/a/b")).unwrap();
        std::fs::write(dir.path().join("media/a/b/clip.mp4"), b"frames").unwrap();

        assert!(matches!(
            buckets.delete("media").await,
            Err(StorageError::BucketNotEmpty(_))
        ));

        std::fs::remove_file(dir.path().join("media/a/b/clip.mp4")).unwrap();
        buckets.delete("media").await.unwrap();
        assert!(!dir.path().join("media").exists());
        assert!(matches!(
            buckets.delete("media").await,
            Err(StorageError::BucketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_reports_subtree_statistics() {
        let (dir, buckets) = manager();
        buckets.create("beta").await.unwrap();
        buckets.create("alpha").await.unwrap();
        std::fs::create_dir_all(dir.path().join("alpha/x/y")).unwrap();
        std::fs::write(dir.path().join("alpha/one.txt"), b"12345").unwrap();
        std::fs::write(dir.path().join("alpha/x/y/two.bin"), b"123").unwrap();
        std::fs::write(dir.path().join("stray-file"), b"not a bucket").unwrap();

        let listed = buckets.list().await.unwrap();
        let summary: Vec<_> = listed
            .iter()
            .map(|b| (b.name.as_str(), b.object_count, b.total_size))
            .collect();
        assert_eq!(summary, vec![("alpha", 2, 8), ("beta", 0, 0)]);

        let info = buckets.info("alpha").await.unwrap();
        assert_eq!(info, listed[0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delete_leaves_foreign_entries_alone() {
        let (dir, buckets) = manager();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("keep.txt"), b"x").unwrap();
        buckets.create("links").await.unwrap();
        std::fs::create_dir_all(dir.path().join("links/sub")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("links/sub/out")).unwrap();

        assert!(matches!(
            buckets.delete("links").await,
            Err(StorageError::BucketNotEmpty(_))
        ));
        assert!(dir.path().join("links/sub").is_dir());
        assert!(outside.path().join("keep.txt").is_file());
    }
}
