//! Task planning: catalog rows to [`DownloadTask`]s
//!
//! Every name is composed before the first task runs, so a budget too small
//! for the catalog aborts the run before any network activity.

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::catalog::CatalogRow;
use crate::downloader::config::MIN_FILENAME_LEN;
use crate::downloader::{DownloadError, DownloadTask, VariantDescriptor};
use crate::output::{compose_stem, sanitize_dir_name};

/// Path separators counted against the budget for `<category>/<name>`.
const SEPARATOR_ALLOWANCE: usize = 2;

/// Stem budget left once the longest category and the longest extension are
/// accounted for.
pub fn item_budget(
    root_budget: usize,
    rows: &[CatalogRow],
    variants: &[VariantDescriptor],
) -> Result<usize, DownloadError> {
    let longest_category = rows
        .iter()
        .map(|r| sanitize_dir_name(&r.category).chars().count())
        .max()
        .unwrap_or(0);
    let longest_extension = variants
        .iter()
        .map(|v| v.file_extension().chars().count())
        .max()
        .unwrap_or(0);

    let budget =
        root_budget.saturating_sub(longest_category + SEPARATOR_ALLOWANCE + longest_extension);
    if budget < MIN_FILENAME_LEN {
        return Err(DownloadError::ConfigurationError(format!(
            "filename budget too small: {root_budget} characters at the destination, \
             {budget} left after the longest category ({longest_category}) \
             and extension ({longest_extension}), at least {MIN_FILENAME_LEN} needed"
        )));
    }
    Ok(budget)
}

/// Build one task per (row, variant) under `root/<category>/`.
///
/// Rows mapping to the same destination file are planned once.
pub fn plan_tasks(
    rows: &[CatalogRow],
    root: &Path,
    variants: &[VariantDescriptor],
    root_budget: usize,
) -> Result<Vec<DownloadTask>, DownloadError> {
    if variants.is_empty() {
        return Err(DownloadError::ConfigurationError(
            "no variants requested".to_string(),
        ));
    }

    std::fs::create_dir_all(root).map_err(|e| {
        DownloadError::IoError(format!("cannot create {}: {e}", root.display()))
    })?;

    let budget = item_budget(root_budget, rows, variants)?;
    debug!(root_budget, budget, "Planning tasks");

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(rows.len() * variants.len());
    for row in rows {
        let stem = compose_stem(&row.title, &row.author, &row.edition, &row.identifier, budget)?;
        let destination_dir = root.join(sanitize_dir_name(&row.category));

        for variant in variants {
            let task = DownloadTask::new(
                row.source_locator.clone(),
                destination_dir.clone(),
                stem.clone(),
                variant.clone(),
                row.title.clone(),
            );
            if seen.insert(task.destination_path()) {
                tasks.push(task);
            } else {
                debug!(title = %row.title, variant = variant.label(), "Duplicate catalog row ignored");
            }
        }
    }

    info!(
        items = rows.len(),
        tasks = tasks.len(),
        "Planned download tasks"
    );
    Ok(tasks)
}
