//! Per-worker cooperative cancellation.
//!
//! Each worker owns one [`CancelFlag`]; only the [`CancellationController`]
//! sets it and only the owning worker polls it, between queue items and
//! between body chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation flag owned by a single worker.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the owning worker should stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn trip(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Holds one flag per worker and trips all of them at once.
#[derive(Debug, Default)]
pub struct CancellationController {
    flags: Vec<Arc<CancelFlag>>,
}

impl CancellationController {
    /// Create a controller with no registered workers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker and hand back the flag it must poll.
    pub fn register(&mut self) -> Arc<CancelFlag> {
        let flag = Arc::new(CancelFlag::new());
        self.flags.push(flag.clone());
        flag
    }

    /// Set every registered worker's flag.
    pub fn cancel_all(&self) {
        for flag in &self.flags {
            flag.trip();
        }
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|flag| flag.is_cancelled())
    }

    /// Number of registered workers.
    pub fn worker_count(&self) -> usize {
        self.flags.len()
    }
}
