//! # Catalog Downloader Library
//!
//! Downloads every item of a publisher catalog into per-category folders,
//! concurrently, idempotently and with safe cancellation.
//!
//! ## Features
//!
//! - **Concurrent Transfers**: fixed-size worker pool draining a shared task queue
//! - **Atomic Placement**: bodies are staged and renamed into place, never written in situ
//! - **Idempotent Runs**: files already on disk are skipped, so a batch can be re-run at will
//! - **Safe Cancellation**: Ctrl+C abandons in-flight transfers and removes their staging files
//! - **Portable Names**: filenames degrade gracefully under a probed filesystem length budget
//!
//! ## Quick Start
//!
//! ```no_run
//! use catalog_downloader::catalog::{parse_catalog, select_rows};
//! use catalog_downloader::downloader::{HttpFetcher, HttpFetcherConfig, PoolConfig, VariantDescriptor, WorkerPool};
//! use catalog_downloader::output::probe_filename_budget;
//! use catalog_downloader::plan::plan_tasks;
//! use catalog_downloader::shutdown::ShutdownCoordinator;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rows = parse_catalog(std::fs::File::open("catalog.csv")?)?;
//! let selection = select_rows(&rows, &["Mathematics and Statistics".to_string()], None);
//!
//! let root = Path::new("./books");
//! let budget = probe_filename_budget(root)?;
//! let tasks = plan_tasks(&selection.rows, root, &[VariantDescriptor::pdf()], budget)?;
//!
//! let fetcher = HttpFetcher::new(HttpFetcherConfig::default())?;
//! let pool = WorkerPool::new(fetcher, root, PoolConfig::new(4), ShutdownCoordinator::shared());
//! let summary = pool.run_all(tasks).await?;
//! println!("{} downloaded, {} failed", summary.succeeded, summary.failed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`catalog`] - CSV catalog loading, caching and row selection
//! - [`output`] - Filename composition and filesystem length probing
//! - [`plan`] - Turns catalog rows into download tasks
//! - [`downloader`] - Queue, worker pool, transfer executor, cancellation
//! - [`cli`] - Command line interface
//! - [`metrics`] - Prometheus metrics
//! - [`shutdown`] - Ctrl+C coordination

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Catalog loading and selection
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Download orchestration
pub mod downloader;

/// Metrics collection and export
pub mod metrics;

/// On-disk naming
pub mod output;

/// Task planning
pub mod plan;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use catalog::CatalogRow;
pub use downloader::{DownloadError, DownloadTask, TransferOutcome, VariantDescriptor};
