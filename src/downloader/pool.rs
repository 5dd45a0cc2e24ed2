//! Fixed-size worker pool draining a [`TaskQueue`].
//!
//! Worker states:
//!
//! - `Running`: pop with timeout, execute, report, `mark_done`
//! - `Draining`: pop returned nothing (queue closed or timed out empty) and no
//!   cancellation is pending, exit
//! - `Cancelling`: flag observed, abandon the current transfer, exit without
//!   touching the remaining queue entries
//!
//! [`WorkerPool::run_all`] returns only after every worker has stopped,
//! whether the run completed or was interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::downloader::cancel::{CancelFlag, CancellationController};
use crate::downloader::config::{PoolConfig, STAGING_DIR_NAME};
use crate::downloader::executor::TransferExecutor;
use crate::downloader::fetch::Fetcher;
use crate::downloader::progress::ProgressTracker;
use crate::downloader::queue::TaskQueue;
use crate::downloader::{DownloadError, DownloadTask, TaskReport, TaskResult, TransferOutcome};
use crate::metrics::TransferMetrics;
use crate::shutdown::SharedShutdown;

/// Aggregate result of one [`WorkerPool::run_all`] call.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Files downloaded
    pub succeeded: usize,
    /// Tasks whose destination already existed
    pub skipped: usize,
    /// Tasks that failed
    pub failed: usize,
    /// Transfers interrupted by cancellation (not counted above)
    pub abandoned: usize,
    /// Tasks never dequeued because the run was cancelled
    pub unprocessed: usize,
    /// Whether the run ended through cancellation
    pub cancelled: bool,
    /// Every concluded task, in completion order per worker
    pub reports: Vec<TaskReport>,
}

impl RunSummary {
    /// Tasks whose failure was flagged retryable.
    pub fn retryable_tasks(&self) -> Vec<DownloadTask> {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_retryable_failure())
            .map(|r| r.task.clone())
            .collect()
    }

    /// Tasks that reached an outcome.
    pub fn concluded(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    fn record(&mut self, report: TaskReport) {
        match report.outcome {
            TransferOutcome::Success { .. } => self.succeeded += 1,
            TransferOutcome::Skipped { .. } => self.skipped += 1,
            TransferOutcome::Failed { .. } => self.failed += 1,
        }
        self.reports.push(report);
    }
}

/// What a worker hands back when it stops.
#[derive(Debug, Default)]
struct WorkerStats {
    reports: Vec<TaskReport>,
    abandoned: usize,
}

struct Worker<F: Fetcher> {
    id: usize,
    queue: Arc<TaskQueue>,
    cancel: Arc<CancelFlag>,
    executor: TransferExecutor<F>,
    tracker: Arc<ProgressTracker>,
    reporter: Option<UnboundedSender<TaskReport>>,
    config: PoolConfig,
}

/// Runs batches of [`DownloadTask`]s with a fixed number of workers.
pub struct WorkerPool<F: Fetcher> {
    fetcher: F,
    staging_dir: PathBuf,
    config: PoolConfig,
    shutdown: SharedShutdown,
    reporter: Option<UnboundedSender<TaskReport>>,
    show_progress: bool,
}

impl<F: Fetcher> WorkerPool<F> {
    /// Create a pool staging its transfers under `<destination_root>/.staging`.
    ///
    /// Every worker gets its own clone of `fetcher`.
    pub fn new(
        fetcher: F,
        destination_root: impl AsRef<Path>,
        config: PoolConfig,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            fetcher,
            staging_dir: destination_root.as_ref().join(STAGING_DIR_NAME),
            config,
            shutdown,
            reporter: None,
            show_progress: false,
        }
    }

    /// Stream every [`TaskReport`] to `reporter` as soon as it is produced.
    pub fn with_reporter(mut self, reporter: UnboundedSender<TaskReport>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Draw progress bars on stderr.
    pub fn with_progress_display(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Staging directory shared by all workers.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Run every task and block until the queue is drained or the run is cancelled.
    pub async fn run_all(&self, tasks: Vec<DownloadTask>) -> Result<RunSummary, DownloadError> {
        prepare_staging(&self.staging_dir).await?;

        let total = tasks.len();
        let queue = Arc::new(TaskQueue::new());
        for task in tasks {
            queue.push(task);
        }

        let tracker = Arc::new(if self.show_progress {
            ProgressTracker::with_display(total as u64)
        } else {
            ProgressTracker::new(total as u64)
        });

        let worker_count = self.config.workers.min(total.max(1));
        info!(tasks = total, workers = worker_count, "Starting download run");

        let mut controller = CancellationController::new();
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                queue: queue.clone(),
                cancel: controller.register(),
                executor: TransferExecutor::new(self.fetcher.clone(), &self.staging_dir)
                    .with_overwrite(self.config.overwrite),
                tracker: tracker.clone(),
                reporter: self.reporter.clone(),
                config: self.config,
            };
            workers.spawn(worker.run());
        }

        let mut summary = RunSummary::default();
        let mut crashed = None;

        // A worker that dies mid-task never marks it done, so the barrier
        // alone could wait forever: watch the workers as well.
        let cancelled = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait_for_shutdown() => break true,
                _ = queue.join_all() => break false,
                Some(joined) = workers.join_next() => {
                    if let Some(e) = absorb_worker(joined, &mut summary) {
                        crashed = Some(e);
                        break false;
                    }
                }
            }
        };
        if cancelled {
            warn!("Interrupt received, cancelling {} workers", controller.worker_count());
        }
        controller.cancel_all();
        queue.close();

        while let Some(joined) = workers.join_next().await {
            if let Some(e) = absorb_worker(joined, &mut summary) {
                crashed.get_or_insert(e);
            }
        }
        summary.cancelled = cancelled;
        tracker.finish();
        tidy_staging(&self.staging_dir).await;

        if let Some(e) = crashed {
            return Err(DownloadError::WorkerError(e.to_string()));
        }

        summary.unprocessed = queue.len();
        if cancelled {
            info!(
                concluded = summary.concluded(),
                abandoned = summary.abandoned,
                unprocessed = summary.unprocessed,
                "Run cancelled; in-flight transfers were abandoned cleanly"
            );
        } else {
            info!(
                succeeded = summary.succeeded,
                skipped = summary.skipped,
                failed = summary.failed,
                "Download run finished"
            );
        }
        Ok(summary)
    }
}

impl<F: Fetcher> Worker<F> {
    async fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        debug!(worker = self.id, "Worker started");

        loop {
            if self.cancel.is_cancelled() {
                debug!(worker = self.id, "Worker cancelling");
                break;
            }

            let Some(task) = self.queue.pop(self.config.pop_timeout).await else {
                if self.cancel.is_cancelled() {
                    debug!(worker = self.id, "Worker cancelling");
                } else {
                    debug!(worker = self.id, "Queue drained, worker exiting");
                }
                break;
            };
            if self.cancel.is_cancelled() {
                // Popped in the same instant the run was cancelled.
                self.queue.requeue(task);
                debug!(worker = self.id, "Worker cancelling");
                break;
            }

            let metrics = TransferMetrics::start(task.variant.label());
            let mut progress = self.tracker.task_progress(&task);
            let result = self
                .executor
                .execute(&task, &self.cancel, &mut progress)
                .await;

            let outcome = match result {
                TaskResult::Abandoned => {
                    metrics.record_abandoned();
                    stats.abandoned += 1;
                    info!(
                        worker = self.id,
                        title = %task.display_title,
                        variant = task.variant.label(),
                        "Transfer abandoned"
                    );
                    break;
                }
                TaskResult::Finished(outcome) => outcome,
            };

            metrics.record_outcome(&outcome, progress.bytes());
            drop(progress);
            self.log_outcome(&task, &outcome);

            if outcome.is_retryable_failure() {
                if let Err(e) = self.executor.reset_session() {
                    warn!(worker = self.id, error = %e, "Failed to replace HTTP session");
                }
            }

            self.tracker.advance(1);
            debug!(worker = self.id, "{}", self.tracker.format_progress());
            let report = TaskReport {
                worker: self.id,
                task,
                outcome,
            };
            if let Some(reporter) = &self.reporter {
                let _ = reporter.send(report.clone());
            }
            stats.reports.push(report);

            if let Err(e) = self.queue.mark_done() {
                error!(worker = self.id, error = %e, "Queue bookkeeping failed");
            }
        }

        stats
    }

    fn log_outcome(&self, task: &DownloadTask, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Success { path } => info!(
                worker = self.id,
                path = %path.display(),
                "Downloaded {}", task.display_title
            ),
            TransferOutcome::Skipped { path, .. } => debug!(
                worker = self.id,
                path = %path.display(),
                "Already present, skipped"
            ),
            TransferOutcome::Failed { reason, retryable } => {
                warn!(
                    worker = self.id,
                    variant = task.variant.label(),
                    retryable = *retryable,
                    "Problem downloading {}: {}", task.display_title, reason
                );
                self.tracker.println(format!(
                    "* Problem downloading: {} [{}]: {}",
                    task.display_title,
                    task.variant.label(),
                    reason
                ));
            }
        }
    }
}

/// Fold a stopped worker into `summary`, returning its error if it crashed.
fn absorb_worker(
    joined: Result<WorkerStats, JoinError>,
    summary: &mut RunSummary,
) -> Option<JoinError> {
    match joined {
        Ok(stats) => {
            summary.abandoned += stats.abandoned;
            for report in stats.reports {
                summary.record(report);
            }
            None
        }
        Err(e) => {
            error!(error = %e, "Worker terminated abnormally");
            Some(e)
        }
    }
}

/// Ensure the staging directory exists and holds nothing from a crashed run.
async fn prepare_staging(staging_dir: &Path) -> Result<(), DownloadError> {
    if tokio::fs::try_exists(staging_dir).await.unwrap_or(false) {
        debug!(path = %staging_dir.display(), "Purging orphaned staging files");
        tokio::fs::remove_dir_all(staging_dir).await.map_err(|e| {
            DownloadError::IoError(format!(
                "Failed to purge staging directory {}: {e}",
                staging_dir.display()
            ))
        })?;
    }
    tokio::fs::create_dir_all(staging_dir).await.map_err(|e| {
        DownloadError::IoError(format!(
            "Failed to create staging directory {}: {e}",
            staging_dir.display()
        ))
    })
}

/// Remove the staging directory if the run left it empty.
async fn tidy_staging(staging_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir(staging_dir).await {
        debug!(path = %staging_dir.display(), error = %e, "Staging directory kept");
    }
}
