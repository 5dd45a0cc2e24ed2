//! Catalog listing commands

use clap::Args;
use serde_json::json;
use std::path::PathBuf;

use super::{Cli, CliError, OutputFormat};
use crate::catalog::{genre_counts, titles_in_genre};

/// List genres
#[derive(Debug, Args)]
pub struct ListGenresArgs {
    /// Folder holding (or receiving) the cached catalog
    pub output: PathBuf,
}

/// List books
#[derive(Debug, Args)]
pub struct ListBooksArgs {
    /// Folder holding (or receiving) the cached catalog
    pub output: PathBuf,

    /// Only list books of this genre (case-insensitive)
    #[arg(long)]
    pub genre: Option<String>,
}

impl ListGenresArgs {
    /// Print every genre with its number of books
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let rows = cli.load_catalog(&self.output).await?;
        let genres = genre_counts(&rows);

        match cli.output_format {
            OutputFormat::Json => {
                let entries: Vec<_> = genres
                    .iter()
                    .map(|(genre, count)| json!({ "genre": genre, "books": count }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Human => {
                println!("\nAvailable genre options:");
                for (genre, count) in &genres {
                    println!("  '{genre}': {count} books");
                }
                println!();
            }
        }
        Ok(())
    }
}

impl ListBooksArgs {
    /// Print book titles, sorted
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let rows = cli.load_catalog(&self.output).await?;
        let titles = titles_in_genre(&rows, self.genre.as_deref());

        match cli.output_format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&titles)?);
            }
            OutputFormat::Human => {
                println!("\nList of available books:");
                for (i, title) in titles.iter().enumerate() {
                    println!("  {}. {}", i + 1, title);
                }
                println!();
            }
        }
        Ok(())
    }
}
