//! Asynchronous depth-first walk over the regular files of a directory tree.
//!
//! Symlinks are never followed or reported. Subdirectories that disappear
//! while the walk is running are skipped; only the root must exist.

use std::{
    fs::Metadata,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs::{self, ReadDir};

/// A regular file found during a walk.
#[derive(Debug)]
pub struct FileEntry {
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// True for errors meaning "nothing there" rather than a real failure.
pub(crate) fn is_missing(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

pub struct FileWalker {
    root: PathBuf,
    pending_dirs: Vec<PathBuf>,
    current: Option<ReadDir>,
}

impl FileWalker {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            pending_dirs: vec![root.to_path_buf()],
            current: None,
        }
    }

    /// Yield the next regular file, or `None` once the tree is exhausted.
    pub async fn next_file(&mut self) -> io::Result<Option<FileEntry>> {
        loop {
            if let Some(entries) = self.current.as_mut() {
                let Some(entry) = entries.next_entry().await? else {
                    self.current = None;
                    continue;
                };

                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(err) if is_missing(&err) => continue,
                    Err(err) => return Err(err),
                };

                if file_type.is_dir() {
                    self.pending_dirs.push(entry.path());
                } else if file_type.is_file() {
                    match entry.metadata().await {
                        Ok(metadata) => {
                            return Ok(Some(FileEntry {
                                path: entry.path(),
                                metadata,
                            }));
                        }
                        Err(err) if is_missing(&err) => continue,
                        Err(err) => return Err(err),
                    }
                }
                continue;
            }

            let Some(dir) = self.pending_dirs.pop() else {
                return Ok(None);
            };
            match fs::read_dir(&dir).await {
                Ok(entries) => self.current = Some(entries),
                Err(err) if dir != self.root && is_missing(&err) => continue,
                Err(err) => return Err(err),
            }
        }
    }
}
