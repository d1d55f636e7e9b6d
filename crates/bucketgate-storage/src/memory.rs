//! In-memory storage backend.
//!
//! Objects live in an ordered map behind a [`RwLock`], so listings come back
//! in lexicographic key order and are paged by resuming after the last key
//! served. Writes are buffered: an object becomes visible only once its whole
//! body has been handed over, which makes every write atomic.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use bucketgate_core::{BackendCapabilities, BackendError, ObjectEntry, PageCursor, PageStep, StorageBackend};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::DEFAULT_PAGE_SIZE;

/// A stored object body and its write time.
#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn entry(&self, key: &str) -> ObjectEntry {
        ObjectEntry {
            key: key.to_owned(),
            size: self.data.len() as u64,
            last_modified: Some(self.last_modified),
        }
    }
}

/// Process-local object store.
///
/// # Examples
///
/// ```
/// use bucketgate_core::StorageBackend;
/// use bucketgate_storage::InMemoryBackend;
/// use bytes::Bytes;
///
/// # tokio_test::block_on(async {
/// let backend = InMemoryBackend::new(100);
/// backend.put("test-files/a.txt", Bytes::from("hello")).await.unwrap();
/// assert_eq!(backend.get("test-files/a.txt").unwrap().as_ref(), b"hello");
/// # });
/// ```
pub struct InMemoryBackend {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("objects_count", &self.objects.read().len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl InMemoryBackend {
    /// Create an empty backend serving `page_size` entries per listing page.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        debug!(page_size, "creating InMemoryBackend");
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Body of the object stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|o| o.data.clone())
    }

    /// Number of stored objects, across all prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Remove every object.
    pub fn reset(&self) {
        debug!("resetting in-memory objects");
        self.objects.write().clear();
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            streaming_writes: false,
            atomic_commit: true,
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), BackendError> {
        let size = data.len();
        self.objects.write().insert(
            key.to_owned(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        trace!(key, size, "stored object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        match self.objects.write().remove(key) {
            Some(_) => {
                trace!(key, "removed object");
                Ok(())
            }
            None => Err(BackendError::NotFound {
                key: key.to_owned(),
            }),
        }
    }

    fn list_by_prefix<'a>(&'a self, prefix: &str) -> Box<dyn PageCursor + 'a> {
        Box::new(MemoryCursor {
            objects: &self.objects,
            prefix: prefix.to_owned(),
            after: None,
            page_size: self.page_size,
            exhausted: false,
        })
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectEntry>, BackendError> {
        Ok(self.objects.read().get(key).map(|o| o.entry(key)))
    }
}

/// Resumes after the last key served, so objects written mid-listing may or
/// may not appear, and none appear twice.
struct MemoryCursor<'a> {
    objects: &'a RwLock<BTreeMap<String, StoredObject>>,
    prefix: String,
    after: Option<String>,
    page_size: usize,
    exhausted: bool,
}

impl MemoryCursor<'_> {
    fn collect_page(&self) -> Vec<ObjectEntry> {
        let lower = match &self.after {
            Some(key) => Bound::Excluded(key.as_str()),
            None => Bound::Included(self.prefix.as_str()),
        };
        let objects = self.objects.read();
        objects
            .range::<str, _>((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(&self.prefix))
            .take(self.page_size)
            .map(|(key, obj)| obj.entry(key))
            .collect()
    }
}

#[async_trait]
impl PageCursor for MemoryCursor<'_> {
    async fn next_page(&mut self) -> PageStep {
        if self.exhausted {
            return PageStep::Done;
        }
        let page = self.collect_page();
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        match page.last() {
            Some(last) => {
                self.after = Some(last.key.clone());
                PageStep::More(page)
            }
            None => PageStep::Done,
        }
    }
}
