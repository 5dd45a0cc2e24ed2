//! Empirical filename length probing
//!
//! Advertised limits (`NAME_MAX`, `pathconf`) are unreliable on network and
//! FUSE mounts, so the budget is found by creating files of increasing length
//! at the destination root and binary searching for the longest accepted name.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::downloader::config::{MAX_FILENAME_LEN, PROBE_PERMISSION_RETRIES};
use crate::downloader::DownloadError;

/// Filesystem operations the prober needs.
pub trait ProbeTarget {
    /// Create a new empty file called `name`. Must fail if it already exists.
    fn create(&self, name: &str) -> io::Result<()>;

    /// Remove the file called `name`.
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// [`ProbeTarget`] backed by a real directory.
#[derive(Debug, Clone)]
pub struct DirProbeTarget {
    root: PathBuf,
}

impl DirProbeTarget {
    /// Probe inside `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ProbeTarget for DirProbeTarget {
    fn create(&self, name: &str) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.root.join(name))
            .map(drop)
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        std::fs::remove_file(self.root.join(name))
    }
}

/// Binary searches the longest filename a [`ProbeTarget`] accepts.
#[derive(Debug)]
pub struct FilenameBudgetProber<T: ProbeTarget> {
    target: T,
    upper_bound: usize,
    permission_retries: u32,
}

/// Result of creating one probe file.
enum Attempt {
    Accepted,
    TooLong,
    Inconclusive(io::Error),
}

impl<T: ProbeTarget> FilenameBudgetProber<T> {
    /// Create a prober with the default bounds.
    pub fn new(target: T) -> Self {
        Self {
            target,
            upper_bound: MAX_FILENAME_LEN,
            permission_retries: PROBE_PERMISSION_RETRIES,
        }
    }

    /// Longest accepted filename length, in `0..=MAX_FILENAME_LEN`.
    ///
    /// Permission-denied and name collisions are inconclusive and retried at
    /// the same bound; after too many of them the probe gives up with a
    /// configuration error. Any other failure aborts the probe.
    pub fn probe(&self) -> Result<usize, DownloadError> {
        let mut lo = 0;
        let mut hi = self.upper_bound;
        let mut inconclusive = 0;

        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            match self.attempt(mid)? {
                Attempt::Accepted => lo = mid,
                Attempt::TooLong => hi = mid - 1,
                Attempt::Inconclusive(e) => {
                    inconclusive += 1;
                    warn!(length = mid, attempt = inconclusive, error = %e, "Inconclusive filename probe");
                    if inconclusive > self.permission_retries {
                        return Err(DownloadError::ConfigurationError(format!(
                            "cannot probe filename length: {e} (gave up after {} attempts)",
                            self.permission_retries
                        )));
                    }
                }
            }
        }

        debug!(budget = lo, "Filename budget probed");
        Ok(lo)
    }

    fn attempt(&self, len: usize) -> Result<Attempt, DownloadError> {
        let name = probe_name(len);
        let created = self.target.create(&name);

        // Clean up whatever may exist, unless the name belonged to someone else.
        let collided = matches!(&created, Err(e) if e.kind() == ErrorKind::AlreadyExists);
        if !collided {
            self.cleanup(&name);
        }

        match created {
            Ok(()) => Ok(Attempt::Accepted),
            Err(e) if is_length_error(&e) => Ok(Attempt::TooLong),
            Err(e) if collided || e.kind() == ErrorKind::PermissionDenied => {
                Ok(Attempt::Inconclusive(e))
            }
            Err(e) => Err(DownloadError::IoError(format!(
                "filename probe of length {len} failed: {e}"
            ))),
        }
    }

    fn cleanup(&self, name: &str) {
        match self.target.remove(name) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound || is_length_error(&e) => {}
            Err(e) => warn!(error = %e, "Failed to remove probe file"),
        }
    }
}

/// Probe the directory at `root`, creating it first if needed.
pub fn probe_filename_budget(root: &Path) -> Result<usize, DownloadError> {
    std::fs::create_dir_all(root).map_err(|e| {
        DownloadError::IoError(format!("cannot create {}: {e}", root.display()))
    })?;
    FilenameBudgetProber::new(DirProbeTarget::new(root)).probe()
}

fn is_length_error(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::InvalidFilename | ErrorKind::InvalidInput)
}

/// Name of exactly `len` characters derived from a time-seeded hash.
fn probe_name(len: usize) -> String {
    let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let digest = format!("{:x}", Sha256::digest(seed.to_le_bytes()));
    digest.chars().cycle().take(len).collect()
}
