//! Multi-producer/multi-consumer task queue with a completion barrier.
//!
//! Removal (`pop`) and completion (`mark_done`) are tracked separately:
//! [`TaskQueue::join_all`] resolves only once every pushed task has been both
//! dequeued and marked done.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{watch, Notify};

use crate::downloader::{DownloadError, DownloadTask};

/// Unbounded, unordered queue of pending [`DownloadTask`]s.
#[derive(Debug)]
pub struct TaskQueue {
    pending: Mutex<VecDeque<DownloadTask>>,
    available: Notify,
    unfinished: watch::Sender<usize>,
    closed: AtomicBool,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (unfinished, _) = watch::channel(0);
        Self {
            pending: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            unfinished,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a task. Never blocks.
    pub fn push(&self, task: DownloadTask) {
        self.lock().push_back(task);
        self.unfinished.send_modify(|n| *n += 1);
        self.available.notify_one();
    }

    /// Put a dequeued, unprocessed task back at the front.
    ///
    /// The task still counts as unfinished, so this does not wake the barrier.
    pub fn requeue(&self, task: DownloadTask) {
        self.lock().push_front(task);
        self.available.notify_one();
    }

    /// Dequeue a task, waiting at most `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout so the caller can re-check its cancellation
    /// flag, and immediately once the queue is closed and empty.
    pub async fn pop(&self, timeout: Duration) -> Option<DownloadTask> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.lock().pop_front() {
                return Some(task);
            }
            if self.is_closed() {
                return None;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // One last look: a push may have landed right at the deadline.
                return self.lock().pop_front();
            }
        }
    }

    /// Record that a dequeued task has been fully processed.
    pub fn mark_done(&self) -> Result<(), DownloadError> {
        let mut underflow = false;
        self.unfinished.send_modify(|n| match n.checked_sub(1) {
            Some(left) => *n = left,
            None => underflow = true,
        });
        if underflow {
            return Err(DownloadError::QueueError(
                "mark_done called more times than tasks were pushed".to_string(),
            ));
        }
        Ok(())
    }

    /// Wait until every pushed task has been dequeued and marked done.
    pub async fn join_all(&self) {
        let mut rx = self.unfinished.subscribe();
        // The sender lives in `self`, so the channel can't close while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop waiting consumers: once empty, `pop` returns `None` without blocking.
    ///
    /// Tasks still queued can be popped; pushing after close is allowed but no
    /// consumer waits for it.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.available.notify_waiters();
    }

    /// Whether [`TaskQueue::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tasks still waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks pushed but not yet marked done.
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<DownloadTask>> {
        // A panicking worker can't leave the deque half-modified.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
