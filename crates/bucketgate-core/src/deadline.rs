//! Scoped operation deadlines.
//!
//! Each gateway operation opens exactly one [`DeadlineScope`] when it starts
//! executing. The scope fixes an absolute deadline and runs backend futures
//! against it. Dropping the scope releases it, so release happens on normal
//! return, error return, unwinding, and when the caller drops the operation
//! future mid-flight. A [`DeadlineTracker`] counts open scopes, which makes
//! leaks observable.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::error::Operation;

/// The deadline of a scope elapsed before the wrapped future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {timeout:?} elapsed")]
pub struct DeadlineElapsed {
    /// Duration the scope was opened with.
    pub timeout: Duration,
}

/// Counts the deadline scopes that are currently open.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct DeadlineTracker {
    open: Arc<AtomicUsize>,
}

impl DeadlineTracker {
    /// Create a tracker with no open scopes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scopes opened through this tracker and not yet dropped.
    #[must_use]
    pub fn open_scopes(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    /// Open a scope whose deadline is `timeout` from now.
    #[must_use]
    pub fn begin(&self, operation: Operation, timeout: Duration) -> DeadlineScope {
        self.open.fetch_add(1, Ordering::AcqRel);
        trace!(operation = %operation, ?timeout, "deadline opened");
        DeadlineScope {
            operation,
            deadline: Instant::now() + timeout,
            timeout,
            open: Arc::clone(&self.open),
        }
    }
}

/// One operation's bounded deadline. Released on drop.
#[derive(Debug)]
pub struct DeadlineScope {
    operation: Operation,
    deadline: Instant,
    timeout: Duration,
    open: Arc<AtomicUsize>,
}

impl DeadlineScope {
    /// Duration the scope was opened with.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Drive `fut` to completion unless the deadline passes first.
    ///
    /// Several futures may be run against the same scope; they all share the
    /// one absolute deadline.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, DeadlineElapsed> {
        tokio::time::timeout_at(self.deadline, fut)
            .await
            .map_err(|_| DeadlineElapsed {
                timeout: self.timeout,
            })
    }
}

impl Drop for DeadlineScope {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
        trace!(operation = %self.operation, "deadline released");
    }
}
