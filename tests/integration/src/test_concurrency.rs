//! Concurrent operations sharing one gateway.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bucketgate_core::{ErrorKind, StorageBackend};
    use bucketgate_storage::InMemoryBackend;
    use futures::future::join_all;

    use crate::{FlakyBackend, gateway_over, local_gateway, memory_gateway, upload_bytes};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_upload_distinct_names_concurrently() {
        let (core, _dir) = local_gateway(7).await;

        let uploads = (0..32).map(|i| {
            let core = core.clone();
            async move {
                let name = format!("batch/file-{i:02}.txt");
                let body = format!("payload {i}");
                upload_bytes(&core, &name, body.as_bytes()).await
            }
        });
        for result in join_all(uploads).await {
            result.unwrap_or_else(|e| panic!("upload failed: {e}"));
        }

        let names = core.list().await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(names.len(), 32);
        assert_eq!(names[0], "batch/file-00.txt");
        assert_eq!(names[31], "batch/file-31.txt");
        assert_eq!(core.open_deadlines(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_leave_one_complete_object_after_racing_overwrites() {
        let (core, dir) = local_gateway(100).await;
        let bodies: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 4096]).collect();

        let uploads = bodies.iter().map(|body| {
            let core = core.clone();
            async move { upload_bytes(&core, "contended.bin", body).await }
        });
        for result in join_all(uploads).await {
            result.unwrap_or_else(|e| panic!("upload failed: {e}"));
        }

        let names = core.list().await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(names, vec!["contended.bin"]);
        let stored = std::fs::read(dir.path().join("test-files/contended.bin"))
            .unwrap_or_else(|e| panic!("read: {e}"));
        assert!(bodies.contains(&stored), "stored object is a mix of uploads");
    }

    #[tokio::test]
    async fn test_should_release_deadlines_when_callers_abandon_operations() {
        let mut flaky = FlakyBackend::new(Arc::new(InMemoryBackend::default()));
        flaky.write_delay = Some(Duration::from_secs(30));
        let core = gateway_over(Arc::new(flaky), Duration::from_secs(60));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let core = core.clone();
                tokio::spawn(async move { upload_bytes(&core, &format!("stuck-{i}"), b"x").await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(core.open_deadlines(), 4);

        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            assert!(handle.await.is_err_and(|e| e.is_cancelled()));
        }
        assert_eq!(core.open_deadlines(), 0);
    }

    #[tokio::test]
    async fn test_should_mix_operations_without_interference() {
        let (core, backend) = memory_gateway(3);
        for i in 0..10 {
            upload_bytes(&core, &format!("keep-{i}"), b"k")
                .await
                .unwrap_or_else(|e| panic!("{e}"));
        }

        let deletes = (0..10).map(|i| {
            let core = core.clone();
            async move { core.delete(&format!("gone-{i}")).await }
        });
        let listings = (0..5).map(|_| {
            let core = core.clone();
            async move { core.list().await }
        });

        let (deleted, listed) = futures::join!(join_all(deletes), join_all(listings));
        assert!(deleted.iter().all(Result::is_ok));
        for names in listed {
            let names = names.unwrap_or_else(|e| panic!("{e}"));
            assert_eq!(names.len(), 10);
        }
        assert_eq!(backend.len(), 10);
    }

    #[tokio::test]
    async fn test_should_keep_rejecting_invalid_names_under_load() {
        let backend = Arc::new(InMemoryBackend::default());
        let core = gateway_over(Arc::clone(&backend) as Arc<dyn StorageBackend>, crate::TEST_TIMEOUT);

        let attempts = (0..16).map(|i| {
            let core = core.clone();
            async move { upload_bytes(&core, &format!("../escape-{i}"), b"x").await }
        });
        for result in join_all(attempts).await {
            let err = result.expect_err("traversal accepted");
            assert_eq!(err.kind(), ErrorKind::InvalidName);
        }
        assert!(backend.is_empty());
    }
}
