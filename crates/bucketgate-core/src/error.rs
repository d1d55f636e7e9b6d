//! Gateway error taxonomy.
//!
//! Every failure a [`crate::GatewayCore`] operation can produce is a
//! [`GatewayError`]. Backend failures are wrapped with the operation and the
//! resolved key (or prefix) so callers can log and diagnose without extra
//! context. [`ErrorKind`] gives a flat, `Copy` view of the category for
//! callers that only need to branch on it (retry policy, status mapping).
//!
//! # Usage
//!
//! ```
//! use bucketgate_core::{ErrorKind, KeyNamespace, Operation};
//! use bucketgate_core::error::GatewayError;
//!
//! let ns = KeyNamespace::default();
//! let err = GatewayError::InvalidName {
//!     operation: Operation::Upload,
//!     source: ns.resolve("../etc/passwd").unwrap_err(),
//! };
//! assert_eq!(err.kind(), ErrorKind::InvalidName);
//! assert!(!err.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use crate::backend::BackendError;
use crate::namespace::InvalidName;

/// The gateway operation an error or deadline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Write an object.
    Upload,
    /// Remove an object.
    Delete,
    /// Enumerate the namespace.
    List,
    /// Look up a single object's metadata.
    Stat,
}

impl Operation {
    /// Stable lowercase name, used in log fields and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Stat => "stat",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat error category of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The logical name failed namespace validation.
    InvalidName,
    /// The backend rejected or failed an upload.
    BackendWriteError,
    /// The backend failed a delete (other than "not found").
    BackendDeleteError,
    /// The backend failed while enumerating the namespace.
    BackendListError,
    /// The backend failed a metadata lookup.
    BackendMetadataError,
    /// The operation's bounded deadline elapsed.
    DeadlineExceeded,
}

impl ErrorKind {
    /// Stable name for logs and adapter output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidName => "InvalidName",
            Self::BackendWriteError => "BackendWriteError",
            Self::BackendDeleteError => "BackendDeleteError",
            Self::BackendListError => "BackendListError",
            Self::BackendMetadataError => "BackendMetadataError",
            Self::DeadlineExceeded => "DeadlineExceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every [`crate::GatewayCore`] operation.
///
/// Outcomes are all-or-nothing: an error never comes with partial results.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The logical name was rejected before any backend call.
    #[error("{operation}: {source}")]
    InvalidName {
        /// Operation that attempted the resolution.
        operation: Operation,
        /// The namespace rejection.
        source: InvalidName,
    },

    /// The backend write failed.
    #[error("upload of {key} failed: {source}")]
    BackendWrite {
        /// Resolved object key.
        key: String,
        /// Whether the backend may have left a partially written object.
        /// Always `false` for backends that commit atomically.
        partial_object_possible: bool,
        /// Underlying backend failure.
        source: BackendError,
    },

    /// The backend delete failed.
    #[error("delete of {key} failed: {source}")]
    BackendDelete {
        /// Resolved object key.
        key: String,
        /// Underlying backend failure.
        source: BackendError,
    },

    /// Enumeration of the namespace failed; no names are returned.
    #[error("listing of prefix {prefix:?} failed: {source}")]
    BackendList {
        /// Namespace prefix being enumerated.
        prefix: String,
        /// Underlying backend failure.
        source: BackendError,
    },

    /// The metadata lookup failed.
    #[error("metadata lookup of {key} failed: {source}")]
    BackendMetadata {
        /// Resolved object key.
        key: String,
        /// Underlying backend failure.
        source: BackendError,
    },

    /// The bounded deadline elapsed before the backend call completed.
    #[error("{operation} of {target} exceeded its deadline of {timeout:?}")]
    DeadlineExceeded {
        /// Operation that timed out.
        operation: Operation,
        /// Resolved key, or the namespace prefix for listings.
        target: String,
        /// The deadline that was applied.
        timeout: Duration,
    },
}

impl GatewayError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::BackendWrite { .. } => ErrorKind::BackendWriteError,
            Self::BackendDelete { .. } => ErrorKind::BackendDeleteError,
            Self::BackendList { .. } => ErrorKind::BackendListError,
            Self::BackendMetadata { .. } => ErrorKind::BackendMetadataError,
            Self::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
        }
    }

    /// Operation that produced this error.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::InvalidName { operation, .. } | Self::DeadlineExceeded { operation, .. } => {
                *operation
            }
            Self::BackendWrite { .. } => Operation::Upload,
            Self::BackendDelete { .. } => Operation::Delete,
            Self::BackendList { .. } => Operation::List,
            Self::BackendMetadata { .. } => Operation::Stat,
        }
    }

    /// The backend failure, if this error wraps one.
    #[must_use]
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::BackendWrite { source, .. }
            | Self::BackendDelete { source, .. }
            | Self::BackendList { source, .. }
            | Self::BackendMetadata { source, .. } => Some(source),
            Self::InvalidName { .. } | Self::DeadlineExceeded { .. } => None,
        }
    }

    /// Whether a caller-side retry may succeed.
    ///
    /// Invalid names never are. Backend failures are, unless the backend
    /// reported a permanent condition (see [`BackendError::is_permanent`]).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidName { .. } => false,
            Self::DeadlineExceeded { .. } => true,
            Self::BackendWrite { source, .. }
            | Self::BackendDelete { source, .. }
            | Self::BackendList { source, .. }
            | Self::BackendMetadata { source, .. } => !source.is_permanent(),
        }
    }
}

/// Configuration error raised while building a gateway.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The namespace prefix is itself unsafe.
    #[error("invalid key prefix {prefix:?}: {reason}")]
    InvalidPrefix {
        /// The rejected prefix.
        prefix: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Convenience result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
