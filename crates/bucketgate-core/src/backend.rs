//! Storage backend capability trait.
//!
//! The gateway never talks to a blob store directly. It holds an
//! `Arc<dyn StorageBackend>` supplied at construction and calls the handful
//! of operations defined here. Backends must be safe for concurrent use by
//! many in-flight operations; connection pooling, if any, is their concern.
//!
//! Listing is modelled as a lazy cursor: each call to
//! [`PageCursor::next_page`] yields one [`PageStep`], either another page of
//! entries, the end of the sequence, or a failure.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncRead;

/// Borrowed upload content. The borrow ends when the backend call returns.
pub type ContentReader<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Error reported by a [`StorageBackend`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The addressed object does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// Key that was not found.
        key: String,
    },

    /// The backend refused the operation.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Backend-provided detail.
        message: String,
    },

    /// The key cannot be stored by this backend.
    #[error("key {key:?} is not storable: {reason}")]
    InvalidKey {
        /// Rejected key.
        key: String,
        /// Backend-specific rule it breaks.
        reason: &'static str,
    },

    /// The backend does not implement this capability.
    #[error("operation not supported by backend: {operation}")]
    Unsupported {
        /// Name of the missing capability.
        operation: &'static str,
    },

    /// Transport or filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    /// Whether this error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether retrying the same call cannot change the result.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::PermissionDenied { .. } | Self::InvalidKey { .. } | Self::Unsupported { .. } => {
                true
            }
            Self::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            Self::NotFound { .. } | Self::Other(_) => false,
        }
    }
}

/// What a backend can do beyond the baseline buffered put.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// [`StorageBackend::put_stream`] is implemented and consumes the body
    /// incrementally.
    pub streaming_writes: bool,
    /// A failed or abandoned write never leaves a visible partial object.
    pub atomic_commit: bool,
}

/// One object as reported by a listing page or metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    /// Full backend key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time, when the backend reports one.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of advancing a [`PageCursor`].
#[derive(Debug)]
pub enum PageStep {
    /// Another page of entries. May be empty; the sequence continues.
    More(Vec<ObjectEntry>),
    /// The sequence is exhausted.
    Done,
    /// Fetching the page failed. The cursor should not be polled again.
    Error(BackendError),
}

/// Lazy, paginated enumeration of keys under a prefix.
#[async_trait]
pub trait PageCursor: Send {
    /// Fetch the next page.
    async fn next_page(&mut self) -> PageStep;
}

/// Capability interface to an external blob store.
///
/// Keys handed to a backend are always fully resolved [`crate::ObjectKey`]
/// strings: non-empty, without `..` segments, never starting with `/`.
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Capabilities the gateway consults before choosing a write path.
    fn capabilities(&self) -> BackendCapabilities;

    /// Store a fully buffered object, replacing any existing one.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BackendError>;

    /// Store an object by consuming `content` incrementally, replacing any
    /// existing one. Returns the number of bytes written.
    ///
    /// Only called when [`BackendCapabilities::streaming_writes`] is set.
    async fn put_stream(
        &self,
        key: &str,
        content: ContentReader<'_>,
        size_hint: Option<u64>,
    ) -> Result<u64, BackendError> {
        let _ = (key, content, size_hint);
        Err(BackendError::Unsupported {
            operation: "put_stream",
        })
    }

    /// Remove an object. Must return [`BackendError::NotFound`] when the key
    /// does not exist.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Start enumerating keys that begin with `prefix`.
    fn list_by_prefix<'a>(&'a self, prefix: &str) -> Box<dyn PageCursor + 'a>;

    /// Look up one object's metadata. `Ok(None)` when it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectEntry>, BackendError>;
}
