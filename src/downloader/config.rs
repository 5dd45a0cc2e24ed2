//! Download configuration constants

use std::time::Duration;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound on workers; more only multiplies connections to the same host.
pub const MAX_WORKERS: usize = 32;

/// How long a worker waits on an empty queue before re-checking its cancellation flag.
pub const POP_TIMEOUT: Duration = Duration::from_millis(250);

/// Write buffer for staging files (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Smallest per-item filename budget a run may start with.
/// Below this the name ladder can no longer hold a title next to an ISBN.
pub const MIN_FILENAME_LEN: usize = 24;

/// Largest filename length the prober will ever report.
pub const MAX_FILENAME_LEN: usize = 1024;

/// Inconclusive (permission denied) probe attempts tolerated before giving up.
pub const PROBE_PERMISSION_RETRIES: u32 = 5;

/// Staging subdirectory under the destination root.
pub const STAGING_DIR_NAME: &str = ".staging";

/// HTTP connect timeout (seconds)
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP read timeout (seconds); applies between body frames, not to the whole transfer.
pub const HTTP_READ_TIMEOUT_SECS: u64 = 60;

/// Default number of re-submission rounds for retryable failures.
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay_ms = delay_ms.min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}

/// Worker pool settings passed explicitly to [`crate::downloader::WorkerPool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of concurrent workers (at least 1).
    pub workers: usize,
    /// Bounded wait for each dequeue.
    pub pop_timeout: Duration,
    /// Download even when the destination exists, replacing it on success.
    pub overwrite: bool,
}

impl PoolConfig {
    /// Create a config with `workers` clamped to `1..=MAX_WORKERS`.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
            pop_timeout: POP_TIMEOUT,
            overwrite: false,
        }
    }

    /// Override the dequeue timeout.
    pub fn with_pop_timeout(mut self, pop_timeout: Duration) -> Self {
        self.pop_timeout = pop_timeout;
        self
    }

    /// Replace existing destination files instead of skipping them.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}
