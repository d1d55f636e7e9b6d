//! Object-storage gateway core for BucketGate.
//!
//! This crate exposes Upload, Delete and List over a blob store supplied as a
//! [`StorageBackend`] capability. Every call resolves its logical name into a
//! fixed key prefix, runs under one bounded deadline, and reports failures
//! through a single error taxonomy. Transport concerns (HTTP, CLI) live in
//! the callers.
//!
//! # Architecture
//!
//! ```text
//! Request adapter (CLI, HTTP, ...)
//!        |
//!        v
//!   GatewayCore ---- KeyNamespace (name -> key)
//!        |     \---- DeadlineScope (one per call)
//!        v
//!   StorageBackend (injected: in-memory, local fs, cloud SDK)
//! ```

pub mod backend;
pub mod config;
pub mod deadline;
pub mod error;
pub mod gateway;
pub mod namespace;
pub mod retry;

pub use backend::{BackendCapabilities, BackendError, ObjectEntry, PageCursor, PageStep, StorageBackend};
pub use config::{BackendKind, GatewayConfig};
pub use error::{ConfigError, ErrorKind, GatewayError, GatewayResult, Operation};
pub use gateway::{GatewayCore, ObjectInfo, UploadReceipt, UploadRequest};
pub use namespace::{KeyNamespace, ObjectKey};
pub use retry::RetryPolicy;
