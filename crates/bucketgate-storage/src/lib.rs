//! Bundled [`bucketgate_core::StorageBackend`] implementations.
//!
//! - [`InMemoryBackend`]: ordered in-process map; buffered, atomic writes.
//! - [`LocalFsBackend`]: directory tree on disk; streaming writes committed
//!   by atomic rename.
//!
//! Cloud SDK backends implement the same trait outside this workspace.

pub mod local;
pub mod memory;

pub use local::LocalFsBackend;
pub use memory::InMemoryBackend;

/// Default number of entries per listing page.
pub const DEFAULT_PAGE_SIZE: usize = bucketgate_core::config::DEFAULT_PAGE_SIZE;
