//! Progress tracking for a batch run.
//!
//! [`ProgressTracker`] counts tasks that reached an outcome (success, skip or
//! non-abandoned failure) against the run total. It is shared by reference
//! between workers; counters are atomics so no lock is taken on the hot path.
//! Terminal rendering through `indicatif` is optional and never affects the
//! counts.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::downloader::DownloadTask;

const OVERALL_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";
const TRANSFER_TEMPLATE: &str = "  {spinner:.blue} {bytes:>10} {binary_bytes_per_sec:>12} {wide_msg}";

/// Thread-safe completed-vs-total counter with optional terminal display.
#[derive(Debug)]
pub struct ProgressTracker {
    completed: AtomicU64,
    total: u64,
    start_time: Instant,
    multi: Option<MultiProgress>,
    overall: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Counter only, nothing is drawn.
    pub fn new(total: u64) -> Self {
        Self {
            completed: AtomicU64::new(0),
            total,
            start_time: Instant::now(),
            multi: None,
            overall: None,
        }
    }

    /// Counter plus an overall bar and one bar per in-flight transfer on stderr.
    pub fn with_display(total: u64) -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let overall = multi.add(ProgressBar::new(total));
        overall.set_style(
            ProgressStyle::default_bar()
                .template(OVERALL_TEMPLATE)
                .expect("hardcoded template is valid")
                .progress_chars("#>-"),
        );
        overall.set_message("files");

        Self {
            overall: Some(overall),
            multi: Some(multi),
            ..Self::new(total)
        }
    }

    /// Record `delta` more tasks as concluded.
    pub fn advance(&self, delta: u64) {
        self.completed.fetch_add(delta, Ordering::AcqRel);
        if let Some(bar) = &self.overall {
            bar.inc(delta);
        }
    }

    /// Tasks concluded so far.
    pub fn current(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Tasks in this run.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.current() as f64 / self.total as f64) * 100.0
    }

    /// Estimate remaining time from the average rate so far.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let done = self.current();
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if done == 0 || elapsed <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(done);
        let rate = done as f64 / elapsed;
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Human-readable progress line for logging.
    pub fn format_progress(&self) -> String {
        let mut line = format!(
            "[PROGRESS] {}/{} files - {:.1}% complete",
            self.current(),
            self.total,
            self.percentage()
        );
        if let Some(remaining) = self.estimate_remaining() {
            if !remaining.is_zero() {
                line.push_str(&format!(" - ~{} remaining", format_duration(remaining)));
            }
        }
        line
    }

    /// Per-transfer byte indicator for `task`.
    pub fn task_progress(&self, task: &DownloadTask) -> TaskProgress {
        let bar = self.multi.as_ref().map(|multi| {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template(TRANSFER_TEMPLATE)
                    .expect("hardcoded template is valid"),
            );
            bar.set_message(format!(
                "{} [{}]",
                task.display_title,
                task.variant.label()
            ));
            bar
        });
        TaskProgress { bar, bytes: 0 }
    }

    /// Print a line above the bars. Does nothing when nothing is drawn.
    pub fn println(&self, line: impl AsRef<str>) {
        if let Some(multi) = &self.multi {
            let _ = multi.println(line.as_ref());
        }
    }

    /// Stop drawing.
    pub fn finish(&self) {
        if let Some(bar) = &self.overall {
            bar.finish_and_clear();
        }
    }
}

/// Byte counter for one in-flight transfer.
#[derive(Debug)]
pub struct TaskProgress {
    bar: Option<ProgressBar>,
    bytes: u64,
}

impl TaskProgress {
    /// Indicator that is never drawn.
    pub fn hidden() -> Self {
        Self {
            bar: None,
            bytes: 0,
        }
    }

    /// Record `n` more bytes received.
    pub fn inc(&mut self, n: u64) {
        self.bytes = self.bytes.saturating_add(n);
        if let Some(bar) = &self.bar {
            bar.inc(n);
        }
    }

    /// Bytes received so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for TaskProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
