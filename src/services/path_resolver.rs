//! Maps bucket names and object keys onto filesystem paths under the storage
//! root.
//!
//! Every path handed out by [`PathResolver`] has passed syntactic validation
//! and, unless containment checks are disabled, has been canonicalized and
//! confirmed to sit strictly below its expected parent directory. The
//! containment check catches escapes that syntax alone cannot see, such as a
//! symlinked directory inside a bucket that points elsewhere.

use super::{
    storage_service::{StorageError, StorageResult},
    walk::is_missing,
};
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

/// A validated bucket name and its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPath {
    /// Canonical (lowercase) bucket name.
    pub name: String,
    pub path: PathBuf,
}

/// A validated object key and its file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    pub bucket: BucketPath,
    /// Normalized key: `/`-separated, no leading slash.
    pub key: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    enforce_containment: bool,
}

impl PathResolver {
    /// `root` should already be canonical; the backend canonicalizes it once
    /// at start-up.
    pub fn new(root: impl Into<PathBuf>, enforce_containment: bool) -> Self {
        Self {
            root: root.into(),
            enforce_containment,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn resolve_bucket_path(&self, name: &str) -> StorageResult<BucketPath> {
        let canonical = validate_bucket_name(name)?;
        let path = self.root.join(&canonical);
        self.ensure_contained(&path, &self.root, name).await?;
        Ok(BucketPath {
            name: canonical,
            path,
        })
    }

    pub async fn resolve_object_path(&self, bucket: &str, key: &str) -> StorageResult<ObjectPath> {
        let canonical_bucket = validate_bucket_name(bucket)?;
        let normalized_key = validate_object_key(key)?;

        let bucket = self.resolve_bucket_path(&canonical_bucket).await?;
        let mut path = bucket.path.clone();
        for segment in normalized_key.split('/') {
            path.push(segment);
        }
        self.ensure_contained(&path, &bucket.path, key).await?;

        Ok(ObjectPath {
            bucket,
            key: normalized_key,
            path,
        })
    }

    async fn ensure_contained(&self, candidate: &Path, parent: &Path, raw: &str) -> StorageResult<()> {
        if !self.enforce_containment {
            return Ok(());
        }

        let resolved = canonicalize_lenient(candidate)
            .await
            .map_err(StorageError::io("canonicalizing", candidate))?;
        let anchor = canonicalize_lenient(parent)
            .await
            .map_err(StorageError::io("canonicalizing", parent))?;

        if resolved != anchor && resolved.starts_with(&anchor) {
            Ok(())
        } else {
            tracing::warn!(
                "rejected `{}`: resolves to {} outside {}",
                raw,
                resolved.display(),
                anchor.display()
            );
            Err(StorageError::InvalidPath(raw.to_string()))
        }
    }
}

/// Validate a bucket name and fold it to its canonical lowercase form.
///
/// Accepts ASCII letters, digits, `-` and `_`, with at least one letter or
/// digit. Length and leading-character rules belong to request validation.
pub fn validate_bucket_name(name: &str) -> StorageResult<String> {
    let invalid = || StorageError::InvalidPath(name.to_string());

    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(invalid());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid());
    }
    if !name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid());
    }

    Ok(name.to_ascii_lowercase())
}

/// Validate an object key and return its normalized form.
///
/// Backslashes become `/` and leading slashes are stripped. Keys containing
/// `..`, NUL, empty segments or `.` segments are rejected so that a key names
/// exactly one file.
pub fn validate_object_key(key: &str) -> StorageResult<String> {
    let invalid = || StorageError::InvalidPath(key.to_string());

    if key.is_empty() || key.contains("..") {
        return Err(invalid());
    }

    let normalized = key.replace('\\', "/");
    let trimmed = normalized.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.contains('\0') {
        return Err(invalid());
    }
    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == ".")
    {
        return Err(invalid());
    }

    Ok(trimmed.to_string())
}

/// Canonicalize the longest existing ancestor of `path` and append the
/// remaining components unchanged.
async fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();

    loop {
        match fs::canonicalize(&existing).await {
            Ok(mut resolved) => {
                for part in tail.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(err) if is_missing(&err) => {
                let Some(name) = existing.file_name().map(|n| n.to_os_string()) else {
                    return Err(err);
                };
                tail.push(name);
                existing.pop();
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn resolver(root: &Path, enforce: bool) -> PathResolver {
        PathResolver::new(std::fs::canonicalize(root).unwrap(), enforce)
    }

    #[test]
    fn bucket_names_fold_to_lowercase() {
        assert_eq!(validate_bucket_name("My-Bucket_1").unwrap(), "my-bucket_1");
        assert_eq!(validate_bucket_name("b").unwrap(), "b");
    }

    #[test]
    fn bucket_names_reject_separators_and_traversal() {
        for name in ["", "..", "../evil", "a/b", "a\\b", "has space", "dot.name", "---", "ünï"] {
            assert!(
                matches!(validate_bucket_name(name), Err(StorageError::InvalidPath(_))),
                "accepted {name:?}"
            );
        }
    }

    #[test]
    fn keys_are_normalized() {
        assert_eq!(validate_object_key("a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(validate_object_key("//lead/x").unwrap(), "lead/x");
        assert_eq!(validate_object_key("win\\style\\k").unwrap(), "win/style/k");
    }

    #[test]
    fn keys_reject_traversal_and_empty_segments() {
        for key in ["", "/", "///", "../x", "a/../../secret", "a//b", "a/", "./a", "a/./b", "a\0b"] {
            assert!(
                matches!(validate_object_key(key), Err(StorageError::InvalidPath(_))),
                "accepted {key:?}"
            );
        }
    }

    #[tokio::test]
    async fn object_paths_nest_under_bucket() {
        let dir = tempdir().unwrap();
        let resolver = resolver(dir.path(), true);

        let object = resolver
            .resolve_object_path("Photos", "2025/img.jpg")
            .await
            .unwrap();
        assert_eq!(object.bucket.name, "photos");
        assert_eq!(object.key, "2025/img.jpg");
        assert_eq!(
            object.path,
            resolver.root().join("photos").join("2025").join("img.jpg")
        );
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_touching_disk() {
        let dir = tempdir().unwrap();
        let resolver = resolver(dir.path(), true);

        assert!(matches!(
            resolver.resolve_bucket_path("../evil").await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            resolver.resolve_object_path("bucket", "../../etc/passwd").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_caught_by_containment() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bucket")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("bucket/link")).unwrap();

        let guarded = resolver(dir.path(), true);
        assert!(matches!(
            guarded.resolve_object_path("bucket", "link/stolen.txt").await,
            Err(StorageError::InvalidPath(_))
        ));

        let unguarded = resolver(dir.path(), false);
        let object = unguarded
            .resolve_object_path("bucket", "link/stolen.txt")
            .await
            .unwrap();
        assert_eq!(object.key, "link/stolen.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_bucket_outside_root_is_rejected() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        let resolver = resolver(dir.path(), true);
        assert!(matches!(
            resolver.resolve_bucket_path("escape").await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}
