//! Transfer metrics
//!
//! Counters and histograms are emitted through the `metrics` facade and are
//! no-ops unless a recorder is installed. [`init_metrics`] installs a
//! Prometheus exporter with a scrape endpoint.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::downloader::TransferOutcome;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls are no-ops.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.lock().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "transfers_succeeded_total",
        Unit::Count,
        "Files downloaded and moved into place"
    );
    describe_counter!(
        "transfers_skipped_total",
        Unit::Count,
        "Tasks skipped because the destination already existed"
    );
    describe_counter!(
        "transfers_failed_total",
        Unit::Count,
        "Tasks that failed, labelled by retryability"
    );
    describe_counter!(
        "transfers_abandoned_total",
        Unit::Count,
        "Transfers interrupted by cancellation"
    );
    describe_counter!(
        "transfer_bytes_total",
        Unit::Bytes,
        "Payload bytes received"
    );
    describe_histogram!(
        "transfer_duration_seconds",
        Unit::Seconds,
        "Wall time of a task from dequeue to outcome"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.lock().await
}

/// Timing and outcome recording for one task.
pub struct TransferMetrics {
    variant: String,
    start_time: Instant,
}

impl TransferMetrics {
    /// Start timing a task for `variant` ("pdf", "epub", ...).
    pub fn start(variant: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            start_time: Instant::now(),
        }
    }

    /// Record a concluded task.
    pub fn record_outcome(&self, outcome: &TransferOutcome, bytes: u64) {
        let variant = self.variant.clone();
        match outcome {
            TransferOutcome::Success { .. } => {
                counter!("transfers_succeeded_total", "variant" => variant.clone()).increment(1);
                counter!("transfer_bytes_total", "variant" => variant.clone()).increment(bytes);
            }
            TransferOutcome::Skipped { .. } => {
                counter!("transfers_skipped_total", "variant" => variant.clone()).increment(1);
            }
            TransferOutcome::Failed { retryable, .. } => {
                counter!(
                    "transfers_failed_total",
                    "variant" => variant.clone(),
                    "retryable" => retryable.to_string(),
                )
                .increment(1);
            }
        }
        histogram!("transfer_duration_seconds", "variant" => variant)
            .record(self.start_time.elapsed().as_secs_f64());
    }

    /// Record a transfer interrupted by cancellation.
    pub fn record_abandoned(&self) {
        counter!("transfers_abandoned_total", "variant" => self.variant.clone()).increment(1);
    }
}
