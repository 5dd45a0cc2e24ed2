//! Transfer executor: performs one [`DownloadTask`].
//!
//! Order of operations per task:
//!
//! 1. skip when the destination already exists (unless overwriting)
//! 2. resolve the locator and rewrite it for the task's variant
//! 3. stream the body into a uniquely named file in the staging directory,
//!    polling the worker's cancellation flag between chunks
//! 4. rename the staging file over the destination (same filesystem)
//!
//! The staging file is owned by a [`tempfile::TempPath`] guard, so every early
//! return (error or cancellation) removes it. A destination path is only ever
//! created by the final rename, so no reader observes a partial file.

use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::downloader::cancel::CancelFlag;
use crate::downloader::config::CHUNK_SIZE;
use crate::downloader::fetch::{rewrite_url, Fetcher, FetchError};
use crate::downloader::progress::TaskProgress;
use crate::downloader::{DownloadTask, FailureReason, TaskResult, TransferOutcome};

/// Executes tasks through a [`Fetcher`] owned by a single worker.
pub struct TransferExecutor<F: Fetcher> {
    fetcher: F,
    staging_dir: PathBuf,
    overwrite: bool,
}

/// Why the body loop stopped early.
enum Interrupted {
    Cancelled,
    Failed(FailureReason),
}

impl From<FetchError> for Interrupted {
    fn from(err: FetchError) -> Self {
        Interrupted::Failed(err.into())
    }
}

impl<F: Fetcher> TransferExecutor<F> {
    /// Create an executor writing staging files under `staging_dir`.
    pub fn new(fetcher: F, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            staging_dir: staging_dir.into(),
            overwrite: false,
        }
    }

    /// Transfer even when the destination exists; the rename replaces it.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Staging directory used by this executor.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Replace the fetcher's session, e.g. after a transient network failure.
    pub fn reset_session(&mut self) -> Result<(), FetchError> {
        self.fetcher.reset()
    }

    /// Run one task to an outcome, or abandon it if `cancel` trips mid-transfer.
    pub async fn execute(
        &self,
        task: &DownloadTask,
        cancel: &CancelFlag,
        progress: &mut TaskProgress,
    ) -> TaskResult {
        let destination = task.destination_path();

        match tokio::fs::try_exists(&destination).await {
            Ok(true) if self.overwrite => {
                debug!(path = %destination.display(), "Destination exists, overwriting");
            }
            Ok(true) => {
                debug!(path = %destination.display(), "Destination exists, skipping");
                return TaskResult::Finished(TransferOutcome::already_exists(&destination));
            }
            Ok(false) => {}
            Err(e) => {
                return TaskResult::Finished(TransferOutcome::failed(FailureReason::Filesystem(
                    format!("cannot check {}: {e}", destination.display()),
                )));
            }
        }

        match self.transfer(task, &destination, cancel, progress).await {
            Ok(()) => TaskResult::Finished(TransferOutcome::Success { path: destination }),
            Err(Interrupted::Cancelled) => TaskResult::Abandoned,
            Err(Interrupted::Failed(reason)) => {
                TaskResult::Finished(TransferOutcome::failed(reason))
            }
        }
    }

    async fn transfer(
        &self,
        task: &DownloadTask,
        destination: &Path,
        cancel: &CancelFlag,
        progress: &mut TaskProgress,
    ) -> Result<(), Interrupted> {
        let resolved = self.fetcher.resolve(&task.source_locator).await?;
        let url = rewrite_url(&resolved, &task.variant);
        if cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }

        debug!(url = %url, title = %task.display_title, "Opening transfer");
        let mut body = self.fetcher.open(&url).await?;

        tokio::fs::create_dir_all(&task.destination_dir)
            .await
            .map_err(|e| fs_failure("create destination directory", &task.destination_dir, e))?;
        let (file, staging_path) = self.create_staging_file(task)?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, tokio::fs::File::from_std(file));

        loop {
            if cancel.is_cancelled() {
                drop(writer);
                discard(staging_path);
                return Err(Interrupted::Cancelled);
            }

            let chunk = match body.next().await {
                Some(chunk) => chunk?,
                None => break,
            };
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| fs_failure("write", &staging_path, e))?;
            progress.inc(chunk.len() as u64);
        }

        writer
            .flush()
            .await
            .map_err(|e| fs_failure("flush", &staging_path, e))?;
        let file = writer.into_inner();
        file.sync_all()
            .await
            .map_err(|e| fs_failure("sync", &staging_path, e))?;
        drop(file);

        staging_path.persist(destination).map_err(|e| {
            fs_failure("move into place", destination, e.error)
        })?;

        debug!(
            path = %destination.display(),
            bytes = progress.bytes(),
            "Transfer complete"
        );
        Ok(())
    }

    fn create_staging_file(
        &self,
        task: &DownloadTask,
    ) -> Result<(std::fs::File, TempPath), Interrupted> {
        tempfile::Builder::new()
            .prefix(&format!("{}-", task.variant.label()))
            .suffix(".part")
            .tempfile_in(&self.staging_dir)
            .map(|tmp| tmp.into_parts())
            .map_err(|e| fs_failure("create staging file in", &self.staging_dir, e))
    }
}

fn discard(staging_path: TempPath) {
    let path = staging_path.to_path_buf();
    if let Err(e) = staging_path.close() {
        warn!(path = %path.display(), error = %e, "Failed to remove staging file");
    }
}

fn fs_failure(action: &str, path: &Path, err: std::io::Error) -> Interrupted {
    Interrupted::Failed(FailureReason::Filesystem(format!(
        "{action} {}: {err}",
        path.display()
    )))
}
