//! Filename composition for catalog items
//!
//! [`compose_stem`] builds `title - author, edition - identifier` and degrades
//! through shorter forms until the result fits the length budget:
//!
//! 1. `title - author, edition - identifier`
//! 2. `title - firstAuthor et al., edition - identifier`
//! 3. `title - firstAuthor et al. - identifier`
//! 4. `title - identifier`
//! 5. `truncated title - identifier`
//!
//! Lengths are counted in characters before normalization. Normalization
//! (ASCII filter, then the substitution table) runs last and never lengthens
//! the name.

use crate::downloader::DownloadError;

/// Separator between the title and the identifier.
const SEPARATOR: &str = " - ";

/// Directory name used for rows without a usable category.
pub const UNCATEGORIZED_DIR: &str = "Uncategorized";

/// Filesystem-hostile characters and what they become.
const SUBSTITUTIONS: &[(char, &str)] = &[
    ('/', "-"),
    ('\\', "-"),
    (':', "-"),
    ('*', ""),
    ('>', ""),
    ('<', ""),
    ('?', ""),
    ('|', ""),
    ('"', ""),
];

/// Compose a filesystem-safe filename stem of at most `max_len` characters.
///
/// Fails with [`DownloadError::ConfigurationError`] when even the truncated
/// form cannot fit, which only happens for a pathologically small budget.
pub fn compose_stem(
    title: &str,
    author: &str,
    edition: &str,
    identifier: &str,
    max_len: usize,
) -> Result<String, DownloadError> {
    let first_author = author.split(',').next().unwrap_or(author).trim();

    let ladder = [
        format!("{title} - {author}, {edition} - {identifier}"),
        format!("{title} - {first_author} et al., {edition} - {identifier}"),
        format!("{title} - {first_author} et al. - {identifier}"),
        format!("{title}{SEPARATOR}{identifier}"),
    ];
    if let Some(name) = ladder.iter().find(|name| char_len(name) <= max_len) {
        return Ok(normalize(name));
    }

    let room = max_len
        .checked_sub(char_len(identifier) + char_len(SEPARATOR))
        .filter(|room| *room >= 1)
        .ok_or_else(|| {
            DownloadError::ConfigurationError(format!(
                "filename budget of {max_len} characters cannot hold identifier {identifier:?}"
            ))
        })?;
    let truncated: String = title.chars().take(room).collect();
    Ok(normalize(&format!("{truncated}{SEPARATOR}{identifier}")))
}

/// Sanitize a category name for use as a directory.
pub fn sanitize_dir_name(category: &str) -> String {
    let name = normalize(category.trim());
    let name = name.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if name.is_empty() {
        UNCATEGORIZED_DIR.to_string()
    } else {
        name.to_string()
    }
}

/// Drop non-printable and non-ASCII characters, then apply [`SUBSTITUTIONS`].
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()) {
        match SUBSTITUTIONS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

/// Whether `c` is replaced or removed by [`normalize`].
pub fn is_forbidden(c: char) -> bool {
    SUBSTITUTIONS.iter().any(|(from, _)| *from == c)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
