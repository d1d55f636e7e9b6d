//! End-to-end tests for the BucketGate gateway.
//!
//! Each test builds a [`GatewayCore`] over one of the bundled backends (a
//! temporary directory for [`LocalFsBackend`], or an [`InMemoryBackend`]),
//! optionally wrapped in a [`FlakyBackend`] that injects failures and delays.
//!
//! Run them with:
//! ```text
//! cargo test -p bucketgate-integration
//! ```

mod test_concurrency;
mod test_failures;

use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bucketgate_core::backend::ContentReader;
use bucketgate_core::{
    BackendCapabilities, BackendError, GatewayCore, GatewayResult, KeyNamespace, ObjectEntry,
    PageCursor, PageStep, StorageBackend, UploadReceipt, UploadRequest,
};
use bucketgate_storage::{InMemoryBackend, LocalFsBackend};
use bytes::Bytes;

static INIT: Once = Once::new();

/// Deadline used by gateways built through these helpers.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Gateway over a fresh local directory. Keep the returned [`tempfile::TempDir`]
/// alive for the duration of the test.
pub async fn local_gateway(page_size: usize) -> (GatewayCore, tempfile::TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let backend = LocalFsBackend::open(dir.path())
        .await
        .unwrap_or_else(|e| panic!("open failed: {e}"))
        .with_page_size(page_size);
    let core = GatewayCore::new(Arc::new(backend), KeyNamespace::default(), TEST_TIMEOUT);
    (core, dir)
}

/// Gateway over a fresh in-memory backend, returned alongside it.
#[must_use]
pub fn memory_gateway(page_size: usize) -> (GatewayCore, Arc<InMemoryBackend>) {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new(page_size));
    let core = GatewayCore::new(
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        KeyNamespace::default(),
        TEST_TIMEOUT,
    );
    (core, backend)
}

/// Gateway over `backend` with the given deadline.
#[must_use]
pub fn gateway_over(backend: Arc<dyn StorageBackend>, timeout: Duration) -> GatewayCore {
    init_tracing();
    GatewayCore::new(backend, KeyNamespace::default(), timeout)
}

/// Upload a byte slice under `name`.
pub async fn upload_bytes(core: &GatewayCore, name: &str, data: &[u8]) -> GatewayResult<UploadReceipt> {
    let mut body = data;
    core.upload(UploadRequest::new(name, &mut body).with_size_hint(data.len() as u64))
        .await
}

/// Wraps a backend and injects failures and delays.
#[derive(Debug)]
pub struct FlakyBackend {
    inner: Arc<dyn StorageBackend>,
    /// 1-based listing page whose fetch fails.
    pub fail_list_on_page: Option<usize>,
    /// Delay applied before every write.
    pub write_delay: Option<Duration>,
    /// Delay applied before every listing page.
    pub page_delay: Option<Duration>,
    /// Report non-atomic writes.
    pub non_atomic: bool,
    /// Number of backend calls received.
    pub calls: AtomicUsize,
}

impl FlakyBackend {
    /// Wrap `inner` without injecting anything yet.
    #[must_use]
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            fail_list_on_page: None,
            write_delay: None,
            page_delay: None,
            non_atomic: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn before_write(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn capabilities(&self) -> BackendCapabilities {
        let mut caps = self.inner.capabilities();
        if self.non_atomic {
            caps.atomic_commit = false;
        }
        caps
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), BackendError> {
        self.before_write().await;
        self.inner.put(key, data).await
    }

    async fn put_stream(
        &self,
        key: &str,
        content: ContentReader<'_>,
        size_hint: Option<u64>,
    ) -> Result<u64, BackendError> {
        self.before_write().await;
        self.inner.put_stream(key, content, size_hint).await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    fn list_by_prefix<'a>(&'a self, prefix: &str) -> Box<dyn PageCursor + 'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::new(FlakyCursor {
            backend: self,
            inner: self.inner.list_by_prefix(prefix),
            served: 0,
        })
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectEntry>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }
}

struct FlakyCursor<'a> {
    backend: &'a FlakyBackend,
    inner: Box<dyn PageCursor + 'a>,
    served: usize,
}

#[async_trait]
impl PageCursor for FlakyCursor<'_> {
    async fn next_page(&mut self) -> PageStep {
        if let Some(delay) = self.backend.page_delay {
            tokio::time::sleep(delay).await;
        }
        if self.backend.fail_list_on_page == Some(self.served + 1) {
            return PageStep::Error(BackendError::Io(std::io::Error::other(
                "injected page failure",
            )));
        }
        let step = self.inner.next_page().await;
        if matches!(step, PageStep::More(_)) {
            self.served += 1;
        }
        step
    }
}
