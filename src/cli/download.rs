//! Download command implementation

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{CliError, ListBooksArgs, ListGenresArgs};
use crate::catalog::{load_catalog, select_rows, CatalogRow, CatalogSource};
use crate::downloader::config::{calculate_backoff, DEFAULT_WORKERS, MAX_RETRIES, MAX_WORKERS};
use crate::downloader::{
    DownloadError, DownloadTask, FailureReason, Fetcher, HttpFetcher, HttpFetcherConfig,
    PoolConfig, RunSummary, TaskReport, TransferOutcome, VariantDescriptor, WorkerPool,
};
use crate::output::probe_filename_budget;
use crate::plan::plan_tasks;
use crate::shutdown::SharedShutdown;

/// Parse and validate the worker count
fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

/// Catalog Downloader CLI
#[derive(Parser, Debug)]
#[command(name = "catalog-downloader")]
#[command(about = "Download the books of a publisher catalog, concurrently and resumably", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Catalog CSV, as a local path or an http(s) URL
    ///
    /// A URL is downloaded once into `<output>/catalog.csv` and reused on
    /// later runs. Without this flag the cached copy is used.
    #[arg(long, global = true)]
    pub catalog: Option<String>,

    /// Number of concurrent downloads (default: 4, max: 32)
    #[arg(long, global = true, default_value_t = DEFAULT_WORKERS, value_parser = parse_workers)]
    pub workers: usize,

    /// Re-submission rounds for transient failures (default: 3, range: 0-10)
    #[arg(long, global = true, default_value_t = MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: u32,

    /// Force download even if the file exists (also refreshes a cached catalog)
    #[arg(long, global = true, default_value_t = false)]
    pub force: bool,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// List the selected titles and log at debug level
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Catalog source given on the command line, if any.
    pub fn catalog_source(&self) -> Option<CatalogSource> {
        self.catalog.as_deref().map(CatalogSource::parse)
    }

    /// Load the catalog, caching it under `output`.
    pub async fn load_catalog(&self, output: &Path) -> Result<Vec<CatalogRow>, CliError> {
        let source = self.catalog_source();
        Ok(load_catalog(source.as_ref(), output, self.force).await?)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download selected books
    Download(DownloadArgs),

    /// List genres with the number of books in each
    ListGenres(ListGenresArgs),

    /// List book titles, optionally restricted to one genre
    ListBooks(ListBooksArgs),
}

/// Download command arguments
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Folder to put downloaded books in
    pub output: PathBuf,

    /// Download only books from this genre (repeatable, case-insensitive)
    #[arg(long)]
    pub genre: Vec<String>,

    /// Download only books whose title contains this text (case-insensitive)
    #[arg(long)]
    pub title: Option<String>,

    /// Download every book in the catalog
    #[arg(long, default_value_t = false)]
    pub all: bool,

    /// Download only PDFs
    #[arg(long, default_value_t = false, conflicts_with = "only_epub")]
    pub only_pdf: bool,

    /// Download only EPUBs
    #[arg(long, default_value_t = false)]
    pub only_epub: bool,
}

impl DownloadArgs {
    /// Variants requested by the `--only-*` flags.
    pub fn variants(&self) -> Vec<VariantDescriptor> {
        let mut variants = Vec::with_capacity(2);
        if !self.only_epub {
            variants.push(VariantDescriptor::pdf());
        }
        if !self.only_pdf {
            variants.push(VariantDescriptor::epub());
        }
        variants
    }

    fn has_selection(&self) -> bool {
        self.all || !self.genre.is_empty() || self.title.is_some()
    }

    /// Execute the download command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        if !self.has_selection() {
            return Err(CliError::InvalidArgument(
                "no books selected: select books by --title or --genre, or use --all to download everything"
                    .to_string(),
            ));
        }

        let rows = cli.load_catalog(&self.output).await?;
        let selection = select_rows(&rows, &self.genre, self.title.as_deref());
        for genre in &selection.unknown_genres {
            warn!(genre = %genre, "Unknown genre ignored");
        }
        if matches!(cli.output_format, OutputFormat::Human) {
            print_selection(&selection.rows, &selection.unknown_genres, cli.verbose);
        }

        let output = self.output.clone();
        let budget = tokio::task::spawn_blocking(move || probe_filename_budget(&output))
            .await
            .map_err(|e| DownloadError::WorkerError(e.to_string()))??;
        let tasks = plan_tasks(&selection.rows, &self.output, &self.variants(), budget)?;
        if tasks.is_empty() {
            info!("Nothing to download");
            return Ok(());
        }

        let fetcher = HttpFetcher::new(HttpFetcherConfig::default())?;
        let totals = run_with_retries(RetryParams {
            fetcher,
            root: &self.output,
            tasks,
            config: PoolConfig::new(cli.workers).with_overwrite(cli.force),
            max_retries: cli.max_retries,
            output_format: cli.output_format,
            shutdown,
        })
        .await?;

        match cli.output_format {
            OutputFormat::Json => output_json(&totals),
            OutputFormat::Human => output_human(&totals),
        }

        if totals.cancelled {
            return Err(CliError::Interrupted);
        }
        Ok(())
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

// ─── Retry rounds ────────────────────────────────────────────────────────────

/// Outcome of a download command across all retry rounds.
#[derive(Debug, Default, Serialize)]
pub struct DownloadTotals {
    /// Files downloaded
    pub succeeded: usize,
    /// Files already present
    pub skipped: usize,
    /// Tasks that still failed after the last round
    pub failed: usize,
    /// Transfers interrupted by Ctrl+C
    pub abandoned: usize,
    /// Tasks never started because of Ctrl+C
    pub unprocessed: usize,
    /// Re-submission rounds run
    pub retry_rounds: u32,
    /// Whether the command was interrupted
    pub cancelled: bool,
    /// Final failures, one per task
    pub failures: Vec<FailureEntry>,
}

/// One task that ended in failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    /// Item title
    pub title: String,
    /// Variant label ("pdf", "epub")
    pub variant: String,
    /// What went wrong
    pub reason: FailureReason,
}

impl FailureEntry {
    fn from_report(report: &TaskReport) -> Option<Self> {
        match &report.outcome {
            TransferOutcome::Failed { reason, .. } => Some(Self {
                title: report.task.display_title.clone(),
                variant: report.task.variant.label().to_string(),
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

impl DownloadTotals {
    /// Fold one round into the totals.
    ///
    /// Retryable failures are only counted when no further round follows.
    fn absorb(&mut self, summary: &RunSummary, final_round: bool) {
        self.succeeded += summary.succeeded;
        self.skipped += summary.skipped;
        self.abandoned += summary.abandoned;
        self.unprocessed += summary.unprocessed;
        self.cancelled |= summary.cancelled;

        for report in &summary.reports {
            if report.outcome.is_retryable_failure() && !final_round {
                continue;
            }
            if let Some(entry) = FailureEntry::from_report(report) {
                self.failures.push(entry);
            }
        }
        self.failed = self.failures.len();
    }
}

/// Inputs of [`run_with_retries`].
pub struct RetryParams<'a, F: Fetcher> {
    /// Fetcher cloned into every worker
    pub fetcher: F,
    /// Destination root
    pub root: &'a Path,
    /// Tasks of the first round
    pub tasks: Vec<DownloadTask>,
    /// Pool settings
    pub config: PoolConfig,
    /// Maximum re-submission rounds
    pub max_retries: u32,
    /// Controls progress bars and streamed reports
    pub output_format: OutputFormat,
    /// Interrupt source
    pub shutdown: SharedShutdown,
}

/// Run `tasks`, re-submitting retryable failures with exponential backoff.
pub async fn run_with_retries<F: Fetcher>(
    params: RetryParams<'_, F>,
) -> Result<DownloadTotals, CliError> {
    let RetryParams {
        fetcher,
        root,
        tasks,
        config,
        max_retries,
        output_format,
        shutdown,
    } = params;

    let mut totals = DownloadTotals::default();
    let mut pending = tasks;
    let mut round = 0;

    loop {
        let mut pool = WorkerPool::new(fetcher.clone(), root, config, shutdown.clone())
            .with_progress_display(output_format == OutputFormat::Human);

        let printer = if output_format == OutputFormat::Json {
            let (tx, rx) = mpsc::unbounded_channel();
            pool = pool.with_reporter(tx);
            Some(tokio::spawn(print_reports(rx)))
        } else {
            None
        };

        let summary = pool.run_all(pending).await;
        drop(pool);
        if let Some(printer) = printer {
            let _ = printer.await;
        }
        let summary = summary?;

        let retry = summary.retryable_tasks();
        let final_round = summary.cancelled || retry.is_empty() || round >= max_retries;
        totals.absorb(&summary, final_round);
        if final_round {
            break;
        }

        round += 1;
        totals.retry_rounds = round;
        let delay = calculate_backoff(round - 1);
        warn!(
            tasks = retry.len(),
            round,
            delay_ms = delay.as_millis() as u64,
            "Re-submitting transient failures"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for_shutdown() => {
                info!("Interrupted while waiting to retry");
                totals.cancelled = true;
                totals.unprocessed += retry.len();
                break;
            }
        }
        pending = retry;
    }

    Ok(totals)
}

async fn print_reports(mut rx: mpsc::UnboundedReceiver<TaskReport>) {
    while let Some(report) = rx.recv().await {
        match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to serialize task report"),
        }
    }
}

// ─── Output ──────────────────────────────────────────────────────────────────

fn print_selection(rows: &[CatalogRow], unknown_genres: &[String], verbose: bool) {
    if verbose {
        for row in rows {
            println!("  {} [{}]", row.title, row.category);
        }
    }
    println!("\n{} titles ready to be downloaded...", rows.len());

    if !unknown_genres.is_empty() {
        let noun = if unknown_genres.len() > 1 { "genres" } else { "genre" };
        println!("The following invalid {noun} will be ignored:");
        for (i, genre) in unknown_genres.iter().enumerate() {
            println!(" {}. {}", i + 1, genre);
        }
        println!();
    }
}

fn output_json(totals: &DownloadTotals) {
    match serde_json::to_string(&serde_json::json!({ "summary": totals })) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to serialize summary"),
    }
}

fn output_human(totals: &DownloadTotals) {
    if totals.cancelled {
        println!("\nInterrupted: in-flight transfers were abandoned cleanly, no partial files were left behind.");
    } else {
        println!("\nFinish downloading.");
    }
    println!("Downloaded: {}", totals.succeeded);
    println!("Skipped (already present): {}", totals.skipped);
    println!("Failed: {}", totals.failed);
    if totals.retry_rounds > 0 {
        println!("Retry rounds: {}", totals.retry_rounds);
    }
    if totals.cancelled {
        println!("Not started: {}", totals.unprocessed + totals.abandoned);
    }
    for failure in &totals.failures {
        eprintln!(
            "* Problem downloading: {} ({}): {}",
            failure.title, failure.variant, failure.reason
        );
    }
}
