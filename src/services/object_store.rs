//! Object operations within a bucket.
//!
//! Uploads stream straight into the destination file in chunks of at most
//! `chunk_size` bytes while the digest is computed and the size limit is
//! enforced. There is no temporary file and no rename. A reader racing an
//! upload can see a partially written file, and concurrent puts to one key
//! end with whichever writer finishes last. A failed or abandoned upload
//! never leaves its partial file behind.

use super::{
    bucket_manager::BucketManager,
    digest::DigestComputer,
    metadata_provider::{MetadataProvider, OCTET_STREAM, guess_content_type},
    path_resolver::{ObjectPath, PathResolver},
    storage_service::{StorageError, StorageResult},
    walk::{FileWalker, is_missing},
};
use crate::models::object::ObjectMetadata;
use bytes::Bytes;
use futures::{Stream, StreamExt, stream::BoxStream};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const OPEN_ATTEMPTS: usize = 3;

/// Request body of a put plus what the caller declared about it.
pub struct ObjectUpload<'a> {
    pub body: BoxStream<'a, io::Result<Bytes>>,
    /// Type declared by the transport (e.g. a multipart part header).
    pub declared_content_type: Option<String>,
    /// Explicit type chosen by the client; wins over everything else.
    pub content_type_override: Option<String>,
    /// Size announced up front, if any.
    pub size_hint: Option<u64>,
}

impl<'a> ObjectUpload<'a> {
    pub fn new<S>(body: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'a,
    {
        Self {
            body: body.boxed(),
            declared_content_type: None,
            content_type_override: None,
            size_hint: None,
        }
    }

    pub fn with_declared_content_type(mut self, content_type: Option<String>) -> Self {
        self.declared_content_type = content_type;
        self
    }

    pub fn with_content_type_override(mut self, content_type: Option<String>) -> Self {
        self.content_type_override = content_type;
        self
    }

    pub fn with_size_hint(mut self, size_hint: Option<u64>) -> Self {
        self.size_hint = size_hint;
        self
    }
}

impl ObjectUpload<'static> {
    /// Single-chunk upload of an in-memory buffer.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(futures::stream::iter([Ok(data)]))
    }
}

/// An open object ready to be streamed out, with its metadata.
#[derive(Debug)]
pub struct ObjectReader {
    pub file: File,
    pub metadata: ObjectMetadata,
}

/// Pick the content type for a put: explicit override, then a non-generic
/// declared type, then a guess from the key, then octet-stream.
pub fn resolve_content_type(
    content_type_override: Option<&str>,
    declared: Option<&str>,
    key: &str,
) -> String {
    if let Some(explicit) = content_type_override.filter(|ct| !ct.trim().is_empty()) {
        return explicit.to_string();
    }
    match declared.filter(|ct| !ct.trim().is_empty() && *ct != OCTET_STREAM) {
        Some(declared) => declared.to_string(),
        None => guess_content_type(key),
    }
}

/// Destination file of an upload in flight.
///
/// Unless [`commit`](Self::commit) or [`discard`](Self::discard) runs first,
/// dropping it (for example when the request future is cancelled) unlinks
/// the file synchronously.
struct PartialObject {
    path: PathBuf,
    armed: bool,
}

impl PartialObject {
    fn arm(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }

    /// Remove the partial file. A cleanup failure is only logged so it never
    /// masks the error that caused the discard.
    async fn discard(mut self) {
        self.armed = false;
        if let Err(err) = fs::remove_file(&self.path).await {
            if err.kind() != ErrorKind::NotFound {
                warn!(
                    "failed to remove partial object {}: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}

impl Drop for PartialObject {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed abandoned upload {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                "failed to remove abandoned upload {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    resolver: PathResolver,
    buckets: BucketManager,
    metadata: MetadataProvider,
    max_object_size: u64,
    chunk_size: usize,
}

impl ObjectStore {
    pub fn new(
        resolver: PathResolver,
        buckets: BucketManager,
        max_object_size: u64,
        chunk_size: usize,
    ) -> Self {
        Self {
            resolver,
            buckets,
            metadata: MetadataProvider::new(chunk_size),
            max_object_size,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Stream an upload into `bucket/key`, replacing any existing object.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        upload: ObjectUpload<'_>,
    ) -> StorageResult<ObjectMetadata> {
        let target = self.locate(bucket, key).await?;

        if let Some(hint) = upload.size_hint {
            if hint > self.max_object_size {
                return Err(StorageError::FileSizeLimitExceeded {
                    size: hint,
                    limit: self.max_object_size,
                });
            }
        }

        let content_type = resolve_content_type(
            upload.content_type_override.as_deref(),
            upload.declared_content_type.as_deref(),
            &target.key,
        );

        let file = match self.open_destination(&target).await {
            Ok(file) => file,
            Err(err) => {
                self.prune_empty_dirs(&target).await;
                return Err(err);
            }
        };
        let partial = PartialObject::arm(&target.path);
        match self.stream_into(file, &target.path, upload.body).await {
            Ok((size, etag)) => {
                partial.commit();
                debug!(
                    "stored `{}/{}` ({} bytes, etag {})",
                    target.bucket.name, target.key, size, etag
                );
                self.metadata
                    .describe_written(
                        &target.bucket.name,
                        &target.key,
                        &target.path,
                        content_type,
                        size,
                        etag,
                    )
                    .await
            }
            Err(err) => {
                partial.discard().await;
                self.prune_empty_dirs(&target).await;
                Err(err)
            }
        }
    }

    /// Create the key's directories below the bucket and open its file
    /// without truncating it. The bucket directory itself is never created
    /// here, so a put racing a bucket delete fails with `BucketNotFound`
    /// instead of resurrecting the bucket.
    async fn open_destination(&self, target: &ObjectPath) -> StorageResult<File> {
        for _ in 0..OPEN_ATTEMPTS {
            self.create_key_dirs(target).await?;
            match OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&target.path)
                .await
            {
                Ok(file) => return Ok(file),
                // A concurrent delete may have pruned a directory we just made.
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    self.buckets.ensure_present(&target.bucket).await?;
                    debug!("key directory of `{}` vanished, retrying", target.key);
                }
                Err(err) => return Err(StorageError::io("creating object file", &target.path)(err)),
            }
        }
        Err(StorageError::Io {
            action: "creating object file",
            path: target.path.clone(),
            source: io::Error::new(ErrorKind::NotFound, "key directory keeps disappearing"),
        })
    }

    async fn create_key_dirs(&self, target: &ObjectPath) -> StorageResult<()> {
        let mut dir = target.bucket.path.clone();
        let mut segments: Vec<&str> = target.key.split('/').collect();
        segments.pop();

        for segment in segments {
            dir.push(segment);
            match fs::create_dir(&dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    self.buckets.ensure_present(&target.bucket).await?;
                    // Parent pruned under us; the next attempt rebuilds it.
                    return Ok(());
                }
                Err(err) => return Err(StorageError::io("creating key directories", &dir)(err)),
            }
        }
        Ok(())
    }

    /// Truncate the freshly opened file and copy the body into it, returning
    /// the byte count and hex digest. Stops at the first chunk that would
    /// take the object past the size limit.
    async fn stream_into(
        &self,
        mut file: File,
        path: &Path,
        body: BoxStream<'_, io::Result<Bytes>>,
    ) -> StorageResult<(u64, String)> {
        file.set_len(0)
            .await
            .map_err(StorageError::io("truncating", path))?;
        let mut reader = StreamReader::new(body);
        let mut buf = vec![0u8; self.chunk_size];
        let mut digest = DigestComputer::new();
        let mut written: u64 = 0;

        loop {
            let read = reader
                .read(&mut buf)
                .await
                .map_err(StorageError::io("receiving upload for", path))?;
            if read == 0 {
                break;
            }

            written += read as u64;
            if written > self.max_object_size {
                return Err(StorageError::FileSizeLimitExceeded {
                    size: written,
                    limit: self.max_object_size,
                });
            }

            digest.update(&buf[..read]);
            file.write_all(&buf[..read])
                .await
                .map_err(StorageError::io("writing", path))?;
        }

        file.flush()
            .await
            .map_err(StorageError::io("flushing", path))?;
        Ok((written, digest.finalize()))
    }

    /// Open an object for streaming together with its metadata.
    pub async fn get(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader> {
        let target = self.locate(bucket, key).await?;
        let metadata = self
            .metadata
            .describe(&target.bucket.name, &target.key, &target.path)
            .await?;
        let file = match File::open(&target.path).await {
            Ok(file) => file,
            Err(err) if is_missing(&err) => return Err(not_found(&target)),
            Err(err) => return Err(StorageError::io("opening", &target.path)(err)),
        };
        Ok(ObjectReader { file, metadata })
    }

    pub async fn head(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        let target = self.locate(bucket, key).await?;
        self.metadata
            .describe(&target.bucket.name, &target.key, &target.path)
            .await
    }

    /// Remove an object, then prune directories it leaves empty up to (not
    /// including) the bucket root. Only the file removal can fail the call.
    pub async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let target = self.locate(bucket, key).await?;

        match fs::metadata(&target.path).await {
            Ok(stat) if stat.is_file() => {}
            Ok(_) => return Err(not_found(&target)),
            Err(err) if is_missing(&err) => return Err(not_found(&target)),
            Err(err) => return Err(StorageError::io("checking", &target.path)(err)),
        }
        match fs::remove_file(&target.path).await {
            Ok(()) => debug!("removed physical file {}", target.path.display()),
            Err(err) if is_missing(&err) => return Err(not_found(&target)),
            Err(err) => return Err(StorageError::io("removing", &target.path)(err)),
        }

        self.prune_empty_dirs(&target).await;
        Ok(())
    }

    /// Every object in the bucket whose key starts with `prefix`, sorted by
    /// key. Each entry gets a freshly computed digest.
    pub async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<ObjectMetadata>> {
        let bucket = self.buckets.require(bucket).await?;
        let mut walker = FileWalker::new(&bucket.path);
        let mut objects = Vec::new();

        loop {
            let entry = match walker.next_file().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) if is_missing(&err) => {
                    return Err(StorageError::BucketNotFound(bucket.name));
                }
                Err(err) => return Err(StorageError::io("walking bucket", &bucket.path)(err)),
            };

            let Some(key) = relative_key(&bucket.path, &entry.path) else {
                warn!("skipping unlistable file {}", entry.path.display());
                continue;
            };
            if let Some(prefix) = prefix {
                if !key.starts_with(prefix) {
                    continue;
                }
            }

            match self.metadata.describe(&bucket.name, &key, &entry.path).await {
                Ok(meta) => objects.push(meta),
                Err(StorageError::ObjectNotFound { .. }) => {
                    debug!("`{}/{}` vanished while listing", bucket.name, key);
                }
                Err(err) => return Err(err),
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    /// Resolve and sandbox the address, then require the bucket to exist.
    async fn locate(&self, bucket: &str, key: &str) -> StorageResult<ObjectPath> {
        let target = self.resolver.resolve_object_path(bucket, key).await?;
        self.buckets.ensure_present(&target.bucket).await?;
        Ok(target)
    }

    /// Remove empty directories from the object's parent upwards, stopping
    /// at the first non-empty one or at the bucket root. Best effort.
    async fn prune_empty_dirs(&self, target: &ObjectPath) {
        let stop = target.bucket.path.as_path();
        let Some(mut current) = target.path.parent().map(Path::to_path_buf) else {
            return;
        };

        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    debug!("pruned empty directory {}", current.display());
                    if !current.pop() {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    warn!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

fn not_found(target: &ObjectPath) -> StorageError {
    StorageError::ObjectNotFound {
        bucket: target.bucket.name.clone(),
        key: target.key.clone(),
    }
}

/// Key of `file` relative to `bucket_root`, `/`-separated.
fn relative_key(bucket_root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(bucket_root).ok()?;
    let segments = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}
