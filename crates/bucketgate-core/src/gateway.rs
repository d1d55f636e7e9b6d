//! The gateway core: Upload, Delete, List and Stat over a storage backend.
//!
//! [`GatewayCore`] applies the same contract to every operation:
//!
//! ```text
//! Validating --(KeyNamespace::resolve)--> Executing --(backend call under deadline)--> Succeeded
//!      |                                      |
//!      +--> Failed(InvalidName)               +--> Failed(Backend*Error | DeadlineExceeded)
//! ```
//!
//! The core holds no mutable state between calls besides the open-deadline
//! counter, never retries, and never returns partial results. Retrying is the
//! caller's decision (see [`crate::retry::RetryPolicy`]).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace, warn};

use crate::backend::{BackendError, ContentReader, ObjectEntry, PageStep, StorageBackend};
use crate::config::GatewayConfig;
use crate::deadline::{DeadlineElapsed, DeadlineTracker};
use crate::error::{ConfigError, GatewayError, GatewayResult, Operation};
use crate::namespace::{KeyNamespace, ObjectKey};

/// Upper bound on the buffer preallocated from an upload's size hint.
const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

/// One upload: a logical name and the content to store under it.
///
/// The content is mutably borrowed, so the gateway cannot hold on to it once
/// [`GatewayCore::upload`] returns.
pub struct UploadRequest<'a> {
    /// Caller-supplied object name, before namespace resolution.
    pub logical_name: &'a str,
    /// Object body.
    pub content: ContentReader<'a>,
    /// Expected body length, if known.
    pub size_hint: Option<u64>,
}

impl std::fmt::Debug for UploadRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("logical_name", &self.logical_name)
            .field("size_hint", &self.size_hint)
            .finish_non_exhaustive()
    }
}

impl<'a> UploadRequest<'a> {
    /// Create a request without a size hint.
    pub fn new(logical_name: &'a str, content: ContentReader<'a>) -> Self {
        Self {
            logical_name,
            content,
            size_hint: None,
        }
    }

    /// Attach the expected body length.
    #[must_use]
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// Logical name the object was stored under.
    pub name: String,
    /// Resolved backend key.
    pub key: String,
    /// Bytes handed to the backend.
    pub bytes_written: u64,
}

/// An object in the namespace, addressed by logical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Logical name (backend key with the prefix stripped).
    pub name: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time, when the backend reports one.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Object-storage gateway over an injected [`StorageBackend`].
///
/// Cloning is cheap and clones share the backend and the deadline counter.
///
/// # Examples
///
/// ```ignore
/// let core = GatewayCore::new(backend, KeyNamespace::default(), Duration::from_secs(50));
/// let mut body: &[u8] = b"hello";
/// core.upload(UploadRequest::new("hello.txt", &mut body)).await?;
/// assert_eq!(core.list().await?, vec!["hello.txt"]);
/// ```
#[derive(Debug, Clone)]
pub struct GatewayCore {
    backend: Arc<dyn StorageBackend>,
    namespace: KeyNamespace,
    timeout: Duration,
    deadlines: DeadlineTracker,
}

impl GatewayCore {
    /// Create a gateway over `backend`, resolving names in `namespace` and
    /// bounding every operation by `timeout`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        namespace: KeyNamespace,
        timeout: Duration,
    ) -> Self {
        debug!(
            backend = backend.name(),
            prefix = namespace.prefix(),
            ?timeout,
            "creating GatewayCore"
        );
        Self {
            backend,
            namespace,
            timeout,
            deadlines: DeadlineTracker::new(),
        }
    }

    /// Create a gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPrefix`] if the configured prefix is unsafe.
    pub fn from_config(
        backend: Arc<dyn StorageBackend>,
        config: &GatewayConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(backend, config.namespace()?, config.timeout()))
    }

    /// The key namespace.
    #[must_use]
    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    /// The per-operation deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The injected backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Number of operation deadlines currently open. Zero when idle.
    #[must_use]
    pub fn open_deadlines(&self) -> usize {
        self.deadlines.open_scopes()
    }

    /// Store `request.content` under `request.logical_name`, replacing any
    /// existing object.
    ///
    /// Streams to the backend when it supports streaming writes, otherwise
    /// buffers the body first. Reading the body counts against the deadline.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidName`] before any backend call.
    /// - [`GatewayError::BackendWrite`] if reading the body or the backend
    ///   write fails. `partial_object_possible` is set for backends without
    ///   atomic commit.
    /// - [`GatewayError::DeadlineExceeded`] if the deadline elapses.
    pub async fn upload(&self, request: UploadRequest<'_>) -> GatewayResult<UploadReceipt> {
        let UploadRequest {
            logical_name,
            content,
            size_hint,
        } = request;
        let key = self.resolve(Operation::Upload, logical_name)?;
        let capabilities = self.backend.capabilities();
        let scope = self.deadlines.begin(Operation::Upload, self.timeout);

        let write = async {
            if capabilities.streaming_writes {
                self.backend
                    .put_stream(key.as_str(), content, size_hint)
                    .await
            } else {
                let data = buffer_content(content, size_hint).await?;
                let len = data.len() as u64;
                self.backend.put(key.as_str(), data).await.map(|()| len)
            }
        };

        let outcome = scope.run(write).await;
        let partial_object_possible = !capabilities.atomic_commit;
        match outcome {
            Ok(Ok(bytes_written)) => {
                debug!(
                    key = %key,
                    bytes_written,
                    streamed = capabilities.streaming_writes,
                    remaining = ?scope.remaining(),
                    "uploaded object"
                );
                Ok(UploadReceipt {
                    name: key.logical_name().to_owned(),
                    key: key.into_string(),
                    bytes_written,
                })
            }
            Ok(Err(source)) => {
                if partial_object_possible {
                    warn!(key = %key, error = %source, "upload failed on non-atomic backend, partial object possible");
                } else {
                    debug!(key = %key, error = %source, "upload failed");
                }
                Err(GatewayError::BackendWrite {
                    key: key.into_string(),
                    partial_object_possible,
                    source,
                })
            }
            Err(elapsed) => {
                if partial_object_possible {
                    warn!(
                        key = %key,
                        timeout = ?scope.timeout(),
                        "upload deadline exceeded on non-atomic backend, partial object possible"
                    );
                }
                Err(deadline_exceeded(Operation::Upload, key.into_string(), elapsed))
            }
        }
    }

    /// Remove the object stored under `logical_name`.
    ///
    /// Deleting an object that does not exist succeeds, so repeated deletes
    /// are safe to retry.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidName`] before any backend call.
    /// - [`GatewayError::BackendDelete`] for backend failures other than
    ///   "not found".
    /// - [`GatewayError::DeadlineExceeded`] if the deadline elapses.
    pub async fn delete(&self, logical_name: &str) -> GatewayResult<()> {
        let key = self.resolve(Operation::Delete, logical_name)?;
        let scope = self.deadlines.begin(Operation::Delete, self.timeout);

        match scope.run(self.backend.delete(key.as_str())).await {
            Ok(Ok(())) => {
                debug!(key = %key, "deleted object");
                Ok(())
            }
            Ok(Err(source)) if source.is_not_found() => {
                debug!(key = %key, "object already absent, delete is a no-op");
                Ok(())
            }
            Ok(Err(source)) => Err(GatewayError::BackendDelete {
                key: key.into_string(),
                source,
            }),
            Err(elapsed) => Err(deadline_exceeded(Operation::Delete, key.into_string(), elapsed)),
        }
    }

    /// Logical names of every object in the namespace, in backend order.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::BackendList`] if any page fails; names gathered from
    ///   earlier pages are discarded.
    /// - [`GatewayError::DeadlineExceeded`] if the whole enumeration does not
    ///   finish within one deadline.
    pub async fn list(&self) -> GatewayResult<Vec<String>> {
        let entries = self.list_entries().await?;
        Ok(entries.into_iter().map(|info| info.name).collect())
    }

    /// Like [`GatewayCore::list`], with size and modification time.
    pub async fn list_entries(&self) -> GatewayResult<Vec<ObjectInfo>> {
        let prefix = self.namespace.prefix();
        let scope = self.deadlines.begin(Operation::List, self.timeout);

        match scope.run(self.enumerate()).await {
            Ok(Ok(objects)) => {
                debug!(
                    prefix,
                    count = objects.len(),
                    remaining = ?scope.remaining(),
                    "listed namespace"
                );
                Ok(objects)
            }
            Ok(Err(source)) => Err(GatewayError::BackendList {
                prefix: prefix.to_owned(),
                source,
            }),
            Err(elapsed) => Err(deadline_exceeded(Operation::List, prefix.to_owned(), elapsed)),
        }
    }

    /// Metadata of the object stored under `logical_name`, or `None` if there
    /// is no such object.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidName`] before any backend call.
    /// - [`GatewayError::BackendMetadata`] if the lookup fails.
    /// - [`GatewayError::DeadlineExceeded`] if the deadline elapses.
    pub async fn stat(&self, logical_name: &str) -> GatewayResult<Option<ObjectInfo>> {
        let key = self.resolve(Operation::Stat, logical_name)?;
        let scope = self.deadlines.begin(Operation::Stat, self.timeout);

        match scope.run(self.backend.head(key.as_str())).await {
            Ok(Ok(entry)) => Ok(entry.map(|entry| ObjectInfo {
                name: key.logical_name().to_owned(),
                size: entry.size,
                last_modified: entry.last_modified,
            })),
            Ok(Err(source)) => Err(GatewayError::BackendMetadata {
                key: key.into_string(),
                source,
            }),
            Err(elapsed) => Err(deadline_exceeded(Operation::Stat, key.into_string(), elapsed)),
        }
    }

    fn resolve(&self, operation: Operation, logical_name: &str) -> GatewayResult<ObjectKey> {
        self.namespace.resolve(logical_name).map_err(|source| {
            debug!(operation = %operation, error = %source, "rejected object name");
            GatewayError::InvalidName { operation, source }
        })
    }

    /// Drain the backend cursor for the namespace prefix.
    ///
    /// Returns on the first `PageStep::Error`, dropping everything gathered.
    async fn enumerate(&self) -> Result<Vec<ObjectInfo>, BackendError> {
        let mut cursor = self.backend.list_by_prefix(self.namespace.prefix());
        let mut objects = Vec::new();
        let mut pages = 0_usize;

        loop {
            match cursor.next_page().await {
                PageStep::More(entries) => {
                    pages += 1;
                    trace!(page = pages, entries = entries.len(), "received listing page");
                    for entry in entries {
                        objects.push(self.to_object_info(entry)?);
                    }
                }
                PageStep::Done => {
                    trace!(pages, "listing exhausted");
                    return Ok(objects);
                }
                PageStep::Error(source) => {
                    debug!(page = pages + 1, error = %source, "listing page failed, discarding partial results");
                    return Err(source);
                }
            }
        }
    }

    fn to_object_info(&self, entry: ObjectEntry) -> Result<ObjectInfo, BackendError> {
        let Some(name) = self.namespace.strip(&entry.key) else {
            return Err(BackendError::Other(anyhow::anyhow!(
                "backend returned key {:?} outside prefix {:?}",
                entry.key,
                self.namespace.prefix()
            )));
        };
        Ok(ObjectInfo {
            name: name.to_owned(),
            size: entry.size,
            last_modified: entry.last_modified,
        })
    }
}

/// Read the whole body into memory for backends without streaming writes.
async fn buffer_content(
    content: ContentReader<'_>,
    size_hint: Option<u64>,
) -> Result<Bytes, BackendError> {
    let capacity = size_hint
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
        .min(MAX_PREALLOCATION);
    let mut buf = Vec::with_capacity(capacity);
    content.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

fn deadline_exceeded(operation: Operation, target: String, elapsed: DeadlineElapsed) -> GatewayError {
    warn!(operation = %operation, target = %target, timeout = ?elapsed.timeout, "operation deadline exceeded");
    GatewayError::DeadlineExceeded {
        operation,
        target,
        timeout: elapsed.timeout,
    }
}
