//! Concurrent fetch orchestration
//!
//! This module is the core of the crate: a bounded pool of workers draining a
//! queue of [`DownloadTask`]s, each transferred with atomic replace-on-success
//! semantics and cooperative cancellation.
//!
//! # Overview
//!
//! 1. **Tasks**: one [`DownloadTask`] per (item, variant) pair, built by the caller
//! 2. **Queue**: [`queue::TaskQueue`] holds pending tasks and provides the `join_all` barrier
//! 3. **Workers**: [`pool::WorkerPool`] runs a fixed number of workers, each owning
//!    a [`fetch::Fetcher`] and a [`cancel::CancelFlag`]
//! 4. **Transfer**: [`executor::TransferExecutor`] skips, streams to staging, renames
//! 5. **Progress**: [`progress::ProgressTracker`] counts concluded tasks
//!
//! # Quick Start
//!
//! ```no_run
//! use catalog_downloader::downloader::{
//!     DownloadTask, HttpFetcher, HttpFetcherConfig, PoolConfig, VariantDescriptor, WorkerPool,
//! };
//! use catalog_downloader::shutdown::ShutdownCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let task = DownloadTask::new(
//!     "https://link.springer.com/openurl?isbn=978-0-387-21736-9",
//!     "./books/Mathematics",
//!     "All of Statistics - Larry Wasserman - 978-0-387-21736-9",
//!     VariantDescriptor::pdf(),
//!     "All of Statistics",
//! );
//!
//! let fetcher = HttpFetcher::new(HttpFetcherConfig::default())?;
//! let pool = WorkerPool::new(fetcher, "./books", PoolConfig::new(4), ShutdownCoordinator::shared());
//! let summary = pool.run_all(vec![task]).await?;
//! println!("{} downloaded, {} skipped", summary.succeeded, summary.skipped);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Only configuration problems and worker crashes surface as [`DownloadError`].
//! Per-task problems are reported as [`TransferOutcome::Failed`] values and
//! never stop the pool:
//! - network errors (retryable, the worker also replaces its HTTP session)
//! - missing items, unexpected status, error pages (not retryable)
//! - staging or rename failures (not retryable, staging file removed)

pub mod cancel;
pub mod config;
pub mod executor;
pub mod fetch;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod task;

pub use cancel::{CancelFlag, CancellationController};
pub use config::PoolConfig;
pub use executor::TransferExecutor;
pub use fetch::{rewrite_url, BodyStream, FetchError, Fetcher, HttpFetcher, HttpFetcherConfig};
pub use pool::{RunSummary, WorkerPool};
pub use progress::{ProgressTracker, TaskProgress};
pub use queue::TaskQueue;
pub use task::{
    DownloadTask, FailureReason, SkipReason, TaskReport, TaskResult, TransferOutcome,
    VariantDescriptor,
};

/// Download errors that abort a whole run
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Invalid setup detected before any transfer starts
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// IO error outside a single task (staging preparation, probing)
    #[error("IO error: {0}")]
    IoError(String),

    /// Queue bookkeeping violated
    #[error("queue error: {0}")]
    QueueError(String),

    /// A worker panicked or was aborted
    #[error("worker error: {0}")]
    WorkerError(String),

    /// Fetcher could not be created
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetchError),
}
