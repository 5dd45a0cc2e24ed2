//! Shared fixtures: an in-memory scripted fetcher and task builders.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use catalog_downloader::downloader::{
    rewrite_url, BodyStream, DownloadTask, FetchError, Fetcher, VariantDescriptor,
};

/// How the fetcher answers for one transfer URL.
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream `chunks`, sleeping `delay` before each
    Body { chunks: Vec<Bytes>, delay: Duration },
    /// Stream `chunks`, then fail mid-body
    FailAfter { chunks: Vec<Bytes>, error: FetchError },
    /// Fail when the transfer is opened
    Fail(FetchError),
    /// Fail the first `failures` opens with a network error, then stream `chunks`
    Flaky { failures: usize, chunks: Vec<Bytes> },
}

impl Script {
    /// `count` chunks of `size` bytes each, `delay` apart.
    pub fn slow(count: usize, size: usize, delay: Duration) -> Self {
        Script::Body {
            chunks: (0..count).map(|_| Bytes::from(vec![b'x'; size])).collect(),
            delay,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    scripts: Mutex<HashMap<String, Script>>,
    attempts: Mutex<HashMap<String, usize>>,
    resolves: AtomicUsize,
    opens: AtomicUsize,
    resets: AtomicUsize,
}

/// [`Fetcher`] answering from per-URL scripts.
///
/// Locators resolve to themselves. URLs without a script stream
/// [`default_body`] in one chunk. Clones share scripts and counters.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFetcher {
    inner: Arc<Inner>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the transfer of `task`.
    pub fn script(&self, task: &DownloadTask, script: Script) {
        let url = transfer_url(task);
        self.inner.scripts.lock().unwrap().insert(url, script);
    }

    pub fn resolves(&self) -> usize {
        self.inner.resolves.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.inner.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn resolve(&self, locator: &str) -> Result<String, FetchError> {
        self.inner.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(locator.to_string())
    }

    async fn open(&self, url: &str) -> Result<BodyStream, FetchError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.inner.attempts.lock().unwrap();
            let n = attempts.entry(url.to_string()).or_default();
            *n += 1;
            *n
        };
        let script = self.inner.scripts.lock().unwrap().get(url).cloned();

        match script {
            None => Ok(stream::iter(vec![Ok::<_, FetchError>(default_body(url))]).boxed()),
            Some(Script::Body { chunks, delay }) => Ok(stream::iter(chunks)
                .then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, FetchError>(chunk)
                })
                .boxed()),
            Some(Script::FailAfter { chunks, error }) => Ok(stream::iter(chunks)
                .map(Ok::<_, FetchError>)
                .chain(stream::once(async move { Err(error) }))
                .boxed()),
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Flaky { failures, chunks }) => {
                if attempt <= failures {
                    Err(FetchError::Network(format!("connection reset (attempt {attempt})")))
                } else {
                    Ok(stream::iter(chunks).map(Ok::<_, FetchError>).boxed())
                }
            }
        }
    }

    fn reset(&mut self) -> Result<(), FetchError> {
        self.inner.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Body served for URLs without a script.
pub fn default_body(url: &str) -> Bytes {
    Bytes::from(format!("payload of {url}"))
}

/// URL the executor will open for `task` through a [`ScriptedFetcher`].
pub fn transfer_url(task: &DownloadTask) -> String {
    rewrite_url(&task.source_locator, &task.variant)
}

/// Task for item `n` in `root/Category`.
pub fn task(root: &Path, n: usize, variant: VariantDescriptor) -> DownloadTask {
    DownloadTask::new(
        format!("http://catalog.test/book/item-{n}"),
        root.join("Category"),
        format!("Item {n} - Author - 978-{n:04}"),
        variant,
        format!("Item {n}"),
    )
}

/// Files left in the staging directory, zero if it was removed.
pub fn staging_files(root: &Path) -> usize {
    match std::fs::read_dir(root.join(".staging")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}
