//! Local filesystem storage backend.
//!
//! Each object is a regular file at `root/<key>`, with `/` in keys mapping to
//! directories. Uploads stream into a [`tempfile::NamedTempFile`] created next
//! to the destination and are renamed into place only once the body has been
//! fully written and synced. If the write fails, or the future is dropped
//! because the gateway deadline fired, the temporary file is removed when its
//! [`tempfile::TempPath`] is dropped and no object becomes visible.
//!
//! Listing walks the directory tree under the prefix on the first page
//! request, sorts the keys, and serves them in fixed-size pages. Temporary
//! upload files are never listed.

use std::collections::VecDeque;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bucketgate_core::backend::ContentReader;
use bucketgate_core::{BackendCapabilities, BackendError, ObjectEntry, PageCursor, PageStep, StorageBackend};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::DEFAULT_PAGE_SIZE;

/// File name prefix of in-progress uploads.
const TEMP_PREFIX: &str = ".bucketgate-upload-";

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFsBackend {
    root: PathBuf,
    page_size: usize,
}

impl LocalFsBackend {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if the root directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "opened LocalFsBackend");
        Ok(Self {
            root,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Serve `page_size` entries per listing page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to its file path, one directory level per `/` segment.
    ///
    /// Keys whose segments would not survive the trip back through
    /// [`Self::key_for`] are refused, so every stored file lists under the
    /// exact key it was written with.
    fn object_path(&self, key: &str) -> Result<PathBuf, BackendError> {
        if let Some(reason) = unstorable_reason(key) {
            return Err(BackendError::InvalidKey {
                key: key.to_owned(),
                reason,
            });
        }
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if Path::new(segment)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(BackendError::PermissionDenied {
                    message: format!("key {key:?} escapes the storage root"),
                });
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Remove now-empty directories between `dir` and the root.
    async fn prune_empty_dirs(&self, mut dir: Option<&Path>) {
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            // Fails (and stops the walk) as soon as a directory still has entries.
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            trace!(dir = %current.display(), "pruned empty directory");
            dir = current.parent();
        }
    }

    /// Collect every object under `prefix`, sorted by key.
    async fn scan(&self, prefix: &str) -> io::Result<Vec<ObjectEntry>> {
        // Only the directory part of the prefix narrows the walk; the rest is
        // matched against full keys.
        let base = prefix.rfind('/').map_or("", |i| &prefix[..i]);
        let start = self.root.join(base);

        let mut entries = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) if e.kind() == io::ErrorKind::NotADirectory => continue,
                Err(e) => return Err(e),
            };
            while let Some(item) = reader.next_entry().await? {
                let file_type = item.file_type().await?;
                let path = item.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let file_name = item.file_name();
                if file_name.to_string_lossy().starts_with(TEMP_PREFIX) {
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    warn!(path = %path.display(), "skipping file with non UTF-8 name");
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }
                let metadata = item.metadata().await?;
                entries.push(ObjectEntry {
                    key,
                    size: metadata.len(),
                    last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Key for a file path under the root, joined with `/`.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }
}

/// Why `key` has no lossless file path, if it has none.
fn unstorable_reason(key: &str) -> Option<&'static str> {
    if key.is_empty() {
        return Some("key is empty");
    }
    for segment in key.split('/') {
        if segment.is_empty() {
            return Some("empty path segment");
        }
        if segment == "." {
            return Some("'.' path segment");
        }
        if segment.starts_with(TEMP_PREFIX) {
            return Some("segment uses the reserved upload prefix");
        }
    }
    None
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            streaming_writes: true,
            atomic_commit: true,
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), BackendError> {
        let mut body: &[u8] = &data;
        self.put_stream(key, &mut body, Some(data.len() as u64))
            .await
            .map(|_| ())
    }

    async fn put_stream(
        &self,
        key: &str,
        content: ContentReader<'_>,
        size_hint: Option<u64>,
    ) -> Result<u64, BackendError> {
        let path = self.object_path(key)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent).await?;

        // Created synchronously: tempfile has no async constructor. The
        // TempPath deletes the file on drop until it is persisted.
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&parent)?;
        let (file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let written = tokio::io::copy(content, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = size_hint {
            if expected != written {
                debug!(key, expected, written, "upload size differs from hint");
            }
        }

        temp_path.persist(&path).map_err(|e| BackendError::Io(e.error))?;
        trace!(key, written, path = %path.display(), "committed object");
        Ok(written)
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let path = match self.object_path(key) {
            Ok(path) => path,
            Err(BackendError::InvalidKey { .. }) => {
                return Err(BackendError::NotFound {
                    key: key.to_owned(),
                });
            }
            Err(e) => return Err(e),
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                trace!(key, "removed object file");
                self.prune_empty_dirs(path.parent()).await;
                Ok(())
            }
            // A directory at the path, or a file where a parent directory
            // would be, both mean no object is stored under the key.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound
                        | io::ErrorKind::IsADirectory
                        | io::ErrorKind::NotADirectory
                ) =>
            {
                Err(BackendError::NotFound {
                    key: key.to_owned(),
                })
            }
            Err(e) => {
                // Some platforms report unlinking a directory as EPERM.
                let is_dir = tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir());
                if is_dir {
                    Err(BackendError::NotFound {
                        key: key.to_owned(),
                    })
                } else {
                    Err(e.into())
                }
            }
        }
    }

    fn list_by_prefix<'a>(&'a self, prefix: &str) -> Box<dyn PageCursor + 'a> {
        Box::new(LocalFsCursor {
            backend: self,
            prefix: prefix.to_owned(),
            remaining: None,
        })
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectEntry>, BackendError> {
        let path = match self.object_path(key) {
            Ok(path) => path,
            Err(BackendError::InvalidKey { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(ObjectEntry {
                key: key.to_owned(),
                size: metadata.len(),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            })),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

struct LocalFsCursor<'a> {
    backend: &'a LocalFsBackend,
    prefix: String,
    /// `None` until the first page triggers the directory walk.
    remaining: Option<VecDeque<ObjectEntry>>,
}

#[async_trait]
impl PageCursor for LocalFsCursor<'_> {
    async fn next_page(&mut self) -> PageStep {
        if self.remaining.is_none() {
            match self.backend.scan(&self.prefix).await {
                Ok(entries) => self.remaining = Some(entries.into()),
                Err(e) => {
                    self.remaining = Some(VecDeque::new());
                    return PageStep::Error(e.into());
                }
            }
        }

        let Some(remaining) = self.remaining.as_mut() else {
            return PageStep::Done;
        };
        if remaining.is_empty() {
            return PageStep::Done;
        }
        let take = self.backend.page_size.min(remaining.len());
        PageStep::More(remaining.drain(..take).collect())
    }
}
