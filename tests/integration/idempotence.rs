//! Re-running a batch over an already populated destination

use catalog_downloader::downloader::{PoolConfig, TransferOutcome, VariantDescriptor, WorkerPool};
use catalog_downloader::shutdown::ShutdownCoordinator;
use tempfile::TempDir;

use crate::common::{default_body, staging_files, task, transfer_url, ScriptedFetcher};

fn batch(root: &std::path::Path) -> Vec<catalog_downloader::DownloadTask> {
    (0..3)
        .flat_map(|n| {
            [
                task(root, n, VariantDescriptor::pdf()),
                task(root, n, VariantDescriptor::epub()),
            ]
        })
        .collect()
}

#[tokio::test]
async fn test_first_run_downloads_everything() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new();
    let pool = WorkerPool::new(
        fetcher.clone(),
        dir.path(),
        PoolConfig::new(4),
        ShutdownCoordinator::shared(),
    );

    let tasks = batch(dir.path());
    let summary = pool.run_all(tasks.clone()).await.unwrap();

    assert_eq!(summary.succeeded, 6);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);
    assert!(!summary.cancelled);
    assert_eq!(fetcher.opens(), 6);

    for t in &tasks {
        let content = std::fs::read(t.destination_path()).unwrap();
        assert_eq!(content, default_body(&transfer_url(t)).to_vec());
    }
    assert_eq!(staging_files(dir.path()), 0);
}

#[tokio::test]
async fn test_second_run_makes_no_network_requests() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new();

    let first = WorkerPool::new(
        fetcher.clone(),
        dir.path(),
        PoolConfig::new(2),
        ShutdownCoordinator::shared(),
    );
    first.run_all(batch(dir.path())).await.unwrap();
    let resolves = fetcher.resolves();
    let opens = fetcher.opens();

    let second = WorkerPool::new(
        fetcher.clone(),
        dir.path(),
        PoolConfig::new(2),
        ShutdownCoordinator::shared(),
    );
    let summary = second.run_all(batch(dir.path())).await.unwrap();

    assert_eq!(summary.skipped, 6);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(fetcher.resolves(), resolves, "second run resolved a locator");
    assert_eq!(fetcher.opens(), opens, "second run opened a transfer");
    assert!(summary
        .reports
        .iter()
        .all(|r| matches!(r.outcome, TransferOutcome::Skipped { .. })));
}

#[tokio::test]
async fn test_orphaned_staging_files_are_purged() {
    let dir = TempDir::new().unwrap();
    let staging = dir.path().join(".staging");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("pdf-crashed.part"), b"half a book").unwrap();

    let pool = WorkerPool::new(
        ScriptedFetcher::new(),
        dir.path(),
        PoolConfig::new(1),
        ShutdownCoordinator::shared(),
    );
    pool.run_all(vec![task(dir.path(), 1, VariantDescriptor::pdf())])
        .await
        .unwrap();

    assert_eq!(staging_files(dir.path()), 0);
}

#[tokio::test]
async fn test_empty_batch_returns_immediately() {
    let dir = TempDir::new().unwrap();
    let pool = WorkerPool::new(
        ScriptedFetcher::new(),
        dir.path(),
        PoolConfig::new(4),
        ShutdownCoordinator::shared(),
    );
    let summary = tokio::time::timeout(std::time::Duration::from_secs(2), pool.run_all(vec![]))
        .await
        .expect("empty run should not hang")
        .unwrap();
    assert_eq!(summary.concluded(), 0);
}

#[tokio::test]
async fn test_overwrite_replaces_existing_files() {
    let dir = TempDir::new().unwrap();
    let existing = task(dir.path(), 1, VariantDescriptor::pdf());
    std::fs::create_dir_all(dir.path().join("Category")).unwrap();
    std::fs::write(existing.destination_path(), b"stale copy").unwrap();

    let fetcher = ScriptedFetcher::new();
    let pool = WorkerPool::new(
        fetcher.clone(),
        dir.path(),
        PoolConfig::new(1).with_overwrite(true),
        ShutdownCoordinator::shared(),
    );
    let summary = pool.run_all(vec![existing.clone()]).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 0);
    assert!(matches!(
        summary.reports[0].outcome,
        TransferOutcome::Success { .. }
    ));
    assert_eq!(fetcher.opens(), 1);
    assert_eq!(
        std::fs::read(existing.destination_path()).unwrap(),
        default_body(&transfer_url(&existing)).to_vec()
    );
    assert_eq!(staging_files(dir.path()), 0);
}

#[tokio::test]
async fn test_existing_files_are_kept_without_overwrite() {
    let dir = TempDir::new().unwrap();
    let existing = task(dir.path(), 1, VariantDescriptor::pdf());
    std::fs::create_dir_all(dir.path().join("Category")).unwrap();
    std::fs::write(existing.destination_path(), b"stale copy").unwrap();

    let fetcher = ScriptedFetcher::new();
    let pool = WorkerPool::new(
        fetcher.clone(),
        dir.path(),
        PoolConfig::new(1),
        ShutdownCoordinator::shared(),
    );
    let summary = pool.run_all(vec![existing.clone()]).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(fetcher.opens(), 0);
    assert_eq!(
        std::fs::read(existing.destination_path()).unwrap(),
        b"stale copy".to_vec()
    );
}
