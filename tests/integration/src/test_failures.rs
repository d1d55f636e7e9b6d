//! Injected backend failures and deadline expiry.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bucketgate_core::{ErrorKind, GatewayError, Operation, RetryPolicy, StorageBackend};
    use bucketgate_storage::{InMemoryBackend, LocalFsBackend};

    use crate::{FlakyBackend, TEST_TIMEOUT, gateway_over, upload_bytes};

    #[tokio::test]
    async fn test_should_fail_list_wholesale_on_third_of_five_pages() {
        let memory = Arc::new(InMemoryBackend::new(1));
        let mut flaky = FlakyBackend::new(memory);
        flaky.fail_list_on_page = Some(3);
        let core = gateway_over(Arc::new(flaky), TEST_TIMEOUT);

        for name in ["a", "b", "c", "d", "e"] {
            upload_bytes(&core, name, b"x").await.unwrap_or_else(|e| panic!("{e}"));
        }

        let err = core.list().await.expect_err("listing should fail");
        assert_eq!(err.kind(), ErrorKind::BackendListError);
        assert!(err.is_retryable());
        assert_eq!(core.open_deadlines(), 0);
    }

    #[tokio::test]
    async fn test_should_bound_whole_enumeration_with_one_deadline() {
        let memory = Arc::new(InMemoryBackend::new(1));
        let mut flaky = FlakyBackend::new(memory);
        flaky.page_delay = Some(Duration::from_millis(40));
        let flaky = Arc::new(flaky);
        let seed = gateway_over(Arc::clone(&flaky) as Arc<dyn StorageBackend>, TEST_TIMEOUT);
        for name in ["a", "b", "c", "d", "e"] {
            upload_bytes(&seed, name, b"x").await.unwrap_or_else(|e| panic!("{e}"));
        }

        // Each page is well within 150ms; six page fetches are not.
        let core = gateway_over(flaky, Duration::from_millis(150));
        let err = core.list().await.expect_err("enumeration should time out");
        assert!(matches!(
            err,
            GatewayError::DeadlineExceeded {
                operation: Operation::List,
                ..
            }
        ));
        assert_eq!(core.open_deadlines(), 0);
    }

    #[tokio::test]
    async fn test_should_time_out_slow_upload_and_leave_no_object() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let local = LocalFsBackend::open(dir.path())
            .await
            .unwrap_or_else(|e| panic!("open: {e}"));
        let mut flaky = FlakyBackend::new(Arc::new(local));
        flaky.write_delay = Some(Duration::from_secs(30));
        let core = gateway_over(Arc::new(flaky), Duration::from_millis(30));

        let err = upload_bytes(&core, "slow.bin", b"never")
            .await
            .expect_err("upload should time out");
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert_eq!(core.open_deadlines(), 0);
        assert!(!dir.path().join("test-files/slow.bin").exists());
    }

    #[tokio::test]
    async fn test_should_flag_partial_object_risk_on_non_atomic_backend() {
        let memory = Arc::new(InMemoryBackend::default());
        let mut flaky = FlakyBackend::new(memory);
        flaky.non_atomic = true;
        let core = gateway_over(Arc::new(flaky), TEST_TIMEOUT);

        let mut reader = failing_reader();
        let err = core
            .upload(bucketgate_core::UploadRequest::new("torn", &mut reader))
            .await
            .expect_err("read failure should surface");
        assert!(matches!(
            err,
            GatewayError::BackendWrite {
                partial_object_possible: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_should_not_call_backend_for_invalid_names() {
        let flaky = Arc::new(FlakyBackend::new(Arc::new(InMemoryBackend::default())));
        let core = gateway_over(Arc::clone(&flaky) as Arc<dyn StorageBackend>, TEST_TIMEOUT);

        for name in ["../etc/passwd", "", "/abs"] {
            assert!(core.delete(name).await.is_err());
            assert!(upload_bytes(&core, name, b"x").await.is_err());
        }
        assert_eq!(flaky.calls(), 0);
    }

    #[tokio::test]
    async fn test_should_recover_with_caller_side_retry() {
        let memory = Arc::new(InMemoryBackend::new(1));
        let mut flaky = FlakyBackend::new(memory);
        flaky.fail_list_on_page = Some(1);
        let flaky = Arc::new(flaky);
        let core = gateway_over(Arc::clone(&flaky) as Arc<dyn StorageBackend>, TEST_TIMEOUT);

        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .base_delay(Duration::from_millis(1))
            .build();
        let err = policy.run(|| core.list()).await.expect_err("every attempt fails");
        assert_eq!(err.kind(), ErrorKind::BackendListError);
        // One cursor per attempt.
        assert_eq!(flaky.calls(), 3);
    }

    /// Reader that fails on first poll.
    fn failing_reader() -> impl tokio::io::AsyncRead + Send + Unpin {
        struct Failing;

        impl tokio::io::AsyncRead for Failing {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::other("connection dropped")))
            }
        }

        Failing
    }
}
