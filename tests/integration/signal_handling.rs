use std::time::Duration;

use catalog_downloader::downloader::{PoolConfig, VariantDescriptor, WorkerPool};
use catalog_downloader::shutdown::ShutdownCoordinator;
use tempfile::TempDir;

use crate::common::{task, ScriptedFetcher};

#[tokio::test]
async fn shutdown_notifies_waiters() {
    let shutdown = ShutdownCoordinator::shared();
    let waiter = {
        let handle = shutdown.clone();
        tokio::spawn(async move {
            handle.wait_for_shutdown().await;
            true
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.request_shutdown();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok());
}

/// Shutdown requested before anyone waits must not deadlock the waiter.
#[tokio::test]
async fn shutdown_requested_before_wait_no_deadlock() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let handle = shutdown.clone();
    let waiter = tokio::spawn(async move {
        handle.wait_for_shutdown().await;
        true
    });

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok(), "wait_for_shutdown() deadlocked despite shutdown already requested");
}

#[tokio::test]
async fn shutdown_concurrent_waiters_all_notified() {
    let shutdown = ShutdownCoordinator::shared();

    let mut waiters = Vec::new();
    for _ in 0..10 {
        let handle = shutdown.clone();
        waiters.push(tokio::spawn(async move {
            handle.wait_for_shutdown().await;
        }));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.request_shutdown();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok(), "A waiter was not notified of shutdown");
    }
}

#[tokio::test]
async fn shutdown_wait_returns_immediately_when_already_set() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let start = tokio::time::Instant::now();
    shutdown.wait_for_shutdown().await;
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_millis(10), "wait_for_shutdown took too long: {:?}", elapsed);
}

/// A shutdown tripped before the run starts processes nothing.
#[tokio::test]
async fn shutdown_before_run_leaves_queue_unprocessed() {
    let dir = TempDir::new().unwrap();
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let fetcher = ScriptedFetcher::new();
    let pool = WorkerPool::new(fetcher.clone(), dir.path(), PoolConfig::new(2), shutdown);
    let tasks: Vec<_> = (0..5)
        .map(|n| task(dir.path(), n, VariantDescriptor::pdf()))
        .collect();

    let summary = tokio::time::timeout(Duration::from_secs(2), pool.run_all(tasks))
        .await
        .expect("run did not unwind")
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.concluded(), 0);
    assert_eq!(summary.abandoned + summary.unprocessed, 5);
    assert_eq!(fetcher.opens(), 0);
}
