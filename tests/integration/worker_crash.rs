//! A worker that panics mid-task ends the run instead of stalling it

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::time::Duration;

use catalog_downloader::downloader::{
    BodyStream, DownloadError, FetchError, Fetcher, PoolConfig, VariantDescriptor, WorkerPool,
};
use catalog_downloader::shutdown::ShutdownCoordinator;
use tempfile::TempDir;

use crate::common::{staging_files, task};

/// Panics when opening any URL containing `poison`.
#[derive(Debug, Clone)]
struct PanickingFetcher {
    poison: &'static str,
}

#[async_trait]
impl Fetcher for PanickingFetcher {
    async fn resolve(&self, locator: &str) -> Result<String, FetchError> {
        Ok(locator.to_string())
    }

    async fn open(&self, url: &str) -> Result<BodyStream, FetchError> {
        if url.contains(self.poison) {
            panic!("fetcher blew up on {url}");
        }
        Ok(stream::iter(vec![Ok::<_, FetchError>(Bytes::from_static(b"body"))]).boxed())
    }

    fn reset(&mut self) -> Result<(), FetchError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_single_worker_panic_returns_worker_error() {
    let dir = TempDir::new().unwrap();
    let pool = WorkerPool::new(
        PanickingFetcher { poison: "item-1" },
        dir.path(),
        PoolConfig::new(1),
        ShutdownCoordinator::shared(),
    );

    let result = tokio::time::timeout(
        Duration::from_secs(3),
        pool.run_all(vec![task(dir.path(), 1, VariantDescriptor::pdf())]),
    )
    .await
    .expect("run should end when its only worker dies");

    assert!(matches!(result, Err(DownloadError::WorkerError(_))));
    assert_eq!(staging_files(dir.path()), 0);
}

#[tokio::test]
async fn test_panic_with_healthy_workers_still_ends_the_run() {
    let dir = TempDir::new().unwrap();
    let pool = WorkerPool::new(
        PanickingFetcher { poison: "item-0" },
        dir.path(),
        PoolConfig::new(2),
        ShutdownCoordinator::shared(),
    );
    let tasks = (0..6)
        .map(|n| task(dir.path(), n, VariantDescriptor::pdf()))
        .collect();

    let result = tokio::time::timeout(Duration::from_secs(3), pool.run_all(tasks))
        .await
        .expect("run should end after a worker dies");

    assert!(matches!(result, Err(DownloadError::WorkerError(_))));
    assert!(!dir.path().join("Category/Item 0 - Author - 978-0000.pdf").exists());
    assert_eq!(staging_files(dir.path()), 0);
}
