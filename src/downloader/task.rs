//! Download task and outcome types

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::downloader::DownloadError;

/// One downloadable representation of a catalog item (e.g. PDF or EPUB).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VariantDescriptor {
    remote_path_rewrite: String,
    file_extension: String,
}

impl VariantDescriptor {
    /// Create a variant, rejecting descriptors no URL or filename could be built from.
    pub fn new(
        remote_path_rewrite: impl Into<String>,
        file_extension: impl Into<String>,
    ) -> Result<Self, DownloadError> {
        let remote_path_rewrite = remote_path_rewrite.into();
        let file_extension = file_extension.into();

        if !remote_path_rewrite.starts_with('/') || !remote_path_rewrite.ends_with('/') {
            return Err(DownloadError::ConfigurationError(format!(
                "variant path rewrite must start and end with '/': {remote_path_rewrite:?}"
            )));
        }
        if file_extension.len() < 2
            || !file_extension.starts_with('.')
            || !file_extension[1..].chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(DownloadError::ConfigurationError(format!(
                "variant extension must look like '.ext': {file_extension:?}"
            )));
        }

        Ok(Self {
            remote_path_rewrite,
            file_extension,
        })
    }

    /// PDF rendition.
    pub fn pdf() -> Self {
        Self {
            remote_path_rewrite: "/content/pdf/".to_string(),
            file_extension: ".pdf".to_string(),
        }
    }

    /// EPUB rendition.
    pub fn epub() -> Self {
        Self {
            remote_path_rewrite: "/download/epub/".to_string(),
            file_extension: ".epub".to_string(),
        }
    }

    /// Path segment that replaces `/book/` in the resolved URL.
    pub fn remote_path_rewrite(&self) -> &str {
        &self.remote_path_rewrite
    }

    /// Extension including the leading dot.
    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    /// Short label ("pdf", "epub") for logs.
    pub fn label(&self) -> &str {
        self.file_extension.trim_start_matches('.')
    }
}

/// Immutable unit of work: fetch one variant of one catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTask {
    /// Catalog locator (usually a redirecting OpenURL)
    pub source_locator: String,
    /// Per-category directory the file lands in
    pub destination_dir: PathBuf,
    /// Composed filename stem, extension excluded
    pub base_name: String,
    /// Which representation to fetch
    pub variant: VariantDescriptor,
    /// Human title for messages
    pub display_title: String,
}

impl DownloadTask {
    /// Create a new task
    pub fn new(
        source_locator: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
        base_name: impl Into<String>,
        variant: VariantDescriptor,
        display_title: impl Into<String>,
    ) -> Self {
        Self {
            source_locator: source_locator.into(),
            destination_dir: destination_dir.into(),
            base_name: base_name.into(),
            variant,
            display_title: display_title.into(),
        }
    }

    /// Final on-disk path of this task's file.
    pub fn destination_path(&self) -> PathBuf {
        self.destination_dir
            .join(format!("{}{}", self.base_name, self.variant.file_extension()))
    }
}

/// Why a task was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Destination file is already present
    AlreadyExists,
}

/// Why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Remote reports no such item
    NotFound,
    /// Non-success HTTP status
    Status(u16),
    /// Remote answered with an error page instead of a payload
    ErrorPage(String),
    /// Locator could not be turned into a request
    InvalidUrl(String),
    /// Connection-level failure (reset, timeout, truncated body)
    Network(String),
    /// Local staging or rename failure
    Filesystem(String),
}

impl FailureReason {
    /// Whether re-submitting the same task may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::ErrorPage(content_type) => {
                write!(f, "server returned an error page ({content_type})")
            }
            Self::InvalidUrl(url) => write!(f, "invalid URL: {url}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Filesystem(msg) => write!(f, "filesystem error: {msg}"),
        }
    }
}

/// Result of a task that ran to a conclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// File downloaded and moved into place
    Success {
        /// Final path
        path: PathBuf,
    },
    /// Nothing to do
    Skipped {
        /// Existing path
        path: PathBuf,
        /// Why
        reason: SkipReason,
    },
    /// Task failed; the run continues
    Failed {
        /// What went wrong
        reason: FailureReason,
        /// Whether a re-submission may succeed
        retryable: bool,
    },
}

impl TransferOutcome {
    /// Build a failure, deriving `retryable` from the reason.
    pub fn failed(reason: FailureReason) -> Self {
        let retryable = reason.is_retryable();
        Self::Failed { reason, retryable }
    }

    /// Skipped because `path` exists.
    pub fn already_exists(path: &Path) -> Self {
        Self::Skipped {
            path: path.to_path_buf(),
            reason: SkipReason::AlreadyExists,
        }
    }

    /// Whether this is a failure flagged retryable.
    pub fn is_retryable_failure(&self) -> bool {
        matches!(self, Self::Failed { retryable: true, .. })
    }
}

/// What the executor hands back to its worker.
///
/// `Abandoned` is not an outcome: the task was interrupted by cancellation
/// and is excluded from every count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// Ran to a conclusion
    Finished(TransferOutcome),
    /// Interrupted by cancellation; staging artifact already removed
    Abandoned,
}

/// A finished task paired with its outcome, as streamed to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// Worker that processed the task
    pub worker: usize,
    /// The task
    pub task: DownloadTask,
    /// How it ended
    pub outcome: TransferOutcome,
}
