//! Remote transfer layer
//!
//! [`Fetcher`] is the seam between the executor and the network. The
//! production implementation, [`HttpFetcher`], wraps a `reqwest::Client`;
//! each worker owns its own fetcher so a poisoned connection pool can be
//! replaced with [`Fetcher::reset`] without touching other workers.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::downloader::config::{HTTP_CONNECT_TIMEOUT_SECS, HTTP_READ_TIMEOUT_SECS};
use crate::downloader::{FailureReason, VariantDescriptor};

/// Response body delivered chunk by chunk.
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Transport-level failures, classified for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Connection reset, timeout, truncated body
    #[error("network error: {0}")]
    Network(String),

    /// Remote reports no such item
    #[error("not found")]
    NotFound,

    /// Any other non-success status
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Remote returned an HTML page instead of the payload
    #[error("error page returned (content-type {0})")]
    ErrorPage(String),

    /// Locator is not a usable URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether a later attempt with a fresh connection may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<FetchError> for FailureReason {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Network(msg) => FailureReason::Network(msg),
            FetchError::NotFound => FailureReason::NotFound,
            FetchError::Status(code) => FailureReason::Status(code),
            FetchError::ErrorPage(content_type) => FailureReason::ErrorPage(content_type),
            FetchError::InvalidUrl(url) => FailureReason::InvalidUrl(url),
        }
    }
}

/// Source of remote bytes used by the transfer executor.
#[async_trait]
pub trait Fetcher: Clone + Send + Sync + 'static {
    /// Follow the locator's redirects and return the final URL.
    async fn resolve(&self, locator: &str) -> Result<String, FetchError>;

    /// Start a streaming GET of `url`.
    async fn open(&self, url: &str) -> Result<BodyStream, FetchError>;

    /// Drop the current session and acquire a fresh one.
    fn reset(&mut self) -> Result<(), FetchError>;
}

/// Build the concrete transfer URL for a variant from a resolved item URL.
///
/// `%2F` is decoded, the first `/book/` segment is replaced by the variant's
/// rewrite and the variant's extension is appended.
pub fn rewrite_url(resolved: &str, variant: &VariantDescriptor) -> String {
    let decoded = resolved.replace("%2F", "/").replace("%2f", "/");
    let rewritten = decoded.replacen("/book/", variant.remote_path_rewrite(), 1);
    format!("{rewritten}{}", variant.file_extension())
}

/// HTTP client settings.
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Time allowed between two body reads
    pub read_timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(HTTP_READ_TIMEOUT_SECS),
        }
    }
}

/// [`Fetcher`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    /// Create a fetcher with its own connection pool.
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound),
            status => Err(FetchError::Status(status.as_u16())),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn resolve(&self, locator: &str) -> Result<String, FetchError> {
        let response = self.get(locator).await?;
        let resolved = response.url().to_string();
        debug!(locator = %locator, resolved = %resolved, "Resolved catalog locator");
        Ok(resolved)
    }

    async fn open(&self, url: &str) -> Result<BodyStream, FetchError> {
        let response = self.get(url).await?;

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if is_error_page(content_type) {
                return Err(FetchError::ErrorPage(content_type.to_string()));
            }
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetchError::Network(e.to_string())))
            .boxed())
    }

    fn reset(&mut self) -> Result<(), FetchError> {
        self.client = build_client(&self.config)?;
        debug!("HTTP session replaced");
        Ok(())
    }
}

fn build_client(config: &HttpFetcherConfig) -> Result<Client, FetchError> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .build()
        .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_builder() {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| err.to_string());
        FetchError::InvalidUrl(url)
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Payloads are binary documents; HTML means a landing or error page.
fn is_error_page(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}
