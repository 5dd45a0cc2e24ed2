//! Catalog table loading and row selection
//!
//! The catalog is a CSV table with one row per item. Only six columns are
//! used; any others are ignored:
//!
//! | column                 | field            |
//! |------------------------|------------------|
//! | `OpenURL`              | `source_locator` |
//! | `Book Title`           | `title`          |
//! | `Author`               | `author`         |
//! | `Edition`              | `edition`        |
//! | `Electronic ISBN`      | `identifier`     |
//! | `English Package Name` | `category`       |
//!
//! A remote catalog is downloaded once into the destination root and reused
//! on later runs unless a refresh is forced.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::downloader::config::{HTTP_CONNECT_TIMEOUT_SECS, HTTP_READ_TIMEOUT_SECS};

/// Filename of the cached catalog inside the cache directory.
pub const CACHED_CATALOG_NAME: &str = "catalog.csv";

/// Columns the catalog must provide.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "OpenURL",
    "Book Title",
    "Author",
    "Edition",
    "Electronic ISBN",
    "English Package Name",
];

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Table could not be parsed
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Remote catalog could not be fetched
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// A required column is absent
    #[error("catalog is missing column {0:?}")]
    MissingColumn(String),

    /// No source given and nothing cached
    #[error("no catalog available: pass --catalog or place a catalog.csv in {0:?}")]
    NoSource(PathBuf),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// One catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CatalogRow {
    /// Locator resolved to the item's landing page
    #[serde(rename = "OpenURL")]
    pub source_locator: String,
    /// Item title
    #[serde(rename = "Book Title")]
    pub title: String,
    /// Comma separated author list
    #[serde(rename = "Author")]
    pub author: String,
    /// Edition label
    #[serde(rename = "Edition")]
    pub edition: String,
    /// Stable identifier (electronic ISBN)
    #[serde(rename = "Electronic ISBN")]
    pub identifier: String,
    /// Category (subject package)
    #[serde(rename = "English Package Name")]
    pub category: String,
}

/// Where the catalog comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// Local CSV file
    Path(PathBuf),
    /// Remote CSV, cached locally
    Url(String),
}

impl CatalogSource {
    /// Interpret `source` as a URL when it has an http(s) scheme, else as a path.
    pub fn parse(source: &str) -> Self {
        let lower = source.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(source.to_string())
        } else {
            Self::Path(PathBuf::from(source))
        }
    }
}

/// Rows picked by [`select_rows`].
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Matching rows, in catalog order
    pub rows: Vec<CatalogRow>,
    /// Requested genres that matched nothing, de-duplicated
    pub unknown_genres: Vec<String>,
}

/// Load the catalog from `source`, or from the cache in `cache_dir` when no source is given.
///
/// A URL source is downloaded into `<cache_dir>/catalog.csv` unless that file
/// already exists and `force` is false.
pub async fn load_catalog(
    source: Option<&CatalogSource>,
    cache_dir: &Path,
    force: bool,
) -> CatalogResult<Vec<CatalogRow>> {
    let cached = cache_dir.join(CACHED_CATALOG_NAME);

    let path = match source {
        Some(CatalogSource::Path(path)) => path.clone(),
        Some(CatalogSource::Url(url)) => {
            if force || !tokio::fs::try_exists(&cached).await.unwrap_or(false) {
                download_catalog(url, cache_dir, &cached).await?;
            } else {
                debug!(path = %cached.display(), "Using cached catalog");
            }
            cached
        }
        None => {
            if !tokio::fs::try_exists(&cached).await.unwrap_or(false) {
                return Err(CatalogError::NoSource(cache_dir.to_path_buf()));
            }
            cached
        }
    };

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| CatalogError::IoError(format!("cannot read {}: {e}", path.display())))?;
    let rows = parse_catalog(bytes.as_slice())?;
    info!(rows = rows.len(), path = %path.display(), "Catalog loaded");
    Ok(rows)
}

/// Parse a CSV catalog, checking that every required column is present.
pub fn parse_catalog<R: Read>(reader: R) -> CatalogResult<Vec<CatalogRow>> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| CatalogError::CsvError(e.to_string()))?
        .clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h.trim() == column) {
            return Err(CatalogError::MissingColumn(column.to_string()));
        }
    }
    let trimmed: csv::StringRecord = headers.iter().map(str::trim).collect();
    csv_reader.set_headers(trimmed);

    csv_reader
        .deserialize()
        .map(|row| row.map_err(|e| CatalogError::CsvError(e.to_string())))
        .collect()
}

/// Select rows by genre (case-insensitive exact match) and title (case-insensitive substring).
///
/// With neither filter every row is selected. Both filters together select
/// rows matching both.
pub fn select_rows(rows: &[CatalogRow], genres: &[String], title: Option<&str>) -> Selection {
    let wanted: Vec<String> = genres.iter().map(|g| g.trim().to_lowercase()).collect();
    let title = title
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());

    let mut unknown_genres: Vec<String> = Vec::new();
    for (genre, lower) in genres.iter().zip(&wanted) {
        let known = rows.iter().any(|r| r.category.to_lowercase() == *lower);
        if !known && !unknown_genres.iter().any(|g| g.to_lowercase() == *lower) {
            unknown_genres.push(genre.trim().to_string());
        }
    }

    let rows = rows
        .iter()
        .filter(|r| wanted.is_empty() || wanted.contains(&r.category.to_lowercase()))
        .filter(|r| {
            title
                .as_deref()
                .is_none_or(|t| r.title.to_lowercase().contains(t))
        })
        .cloned()
        .collect();

    Selection {
        rows,
        unknown_genres,
    }
}

/// Number of rows per genre, sorted by genre name.
pub fn genre_counts(rows: &[CatalogRow]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.category.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(genre, count)| (genre.to_string(), count))
        .collect()
}

/// Sorted titles in `genre` (case-insensitive), or every title when `genre` is `None`.
pub fn titles_in_genre(rows: &[CatalogRow], genre: Option<&str>) -> Vec<String> {
    let genre = genre.map(str::to_lowercase);
    let mut titles: Vec<String> = rows
        .iter()
        .filter(|r| {
            genre
                .as_deref()
                .is_none_or(|g| r.category.to_lowercase() == g)
        })
        .map(|r| r.title.clone())
        .collect();
    titles.sort();
    titles
}

async fn download_catalog(url: &str, cache_dir: &Path, cached: &Path) -> CatalogResult<()> {
    info!(url = %url, "Downloading catalog");

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_READ_TIMEOUT_SECS))
        .build()
        .map_err(|e| CatalogError::HttpError(e.to_string()))?;
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| CatalogError::HttpError(e.to_string()))?;
    let body = response
        .bytes()
        .await
        .map_err(|e| CatalogError::HttpError(e.to_string()))?;

    // Refuse to cache something that isn't a catalog.
    parse_catalog(body.as_ref())?;

    tokio::fs::create_dir_all(cache_dir)
        .await
        .map_err(|e| CatalogError::IoError(format!("cannot create {}: {e}", cache_dir.display())))?;
    let staged = tempfile::NamedTempFile::new_in(cache_dir)
        .map_err(|e| CatalogError::IoError(e.to_string()))?;
    tokio::fs::write(staged.path(), &body)
        .await
        .map_err(|e| CatalogError::IoError(e.to_string()))?;
    staged
        .persist(cached)
        .map_err(|e| CatalogError::IoError(format!("cannot save {}: {}", cached.display(), e.error)))?;

    debug!(path = %cached.display(), bytes = body.len(), "Catalog cached");
    Ok(())
}
