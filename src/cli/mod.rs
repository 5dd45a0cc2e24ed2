//! CLI command implementations

pub mod download;
pub mod error;
pub mod listing;

pub use download::{
    run_with_retries, Cli, Commands, DownloadArgs, DownloadTotals, OutputFormat, RetryParams,
};
pub use error::CliError;
pub use listing::{ListBooksArgs, ListGenresArgs};
