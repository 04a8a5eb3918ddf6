//! Utility functions for text cleanup, timestamps, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - HTML-to-text flattening for leads and descriptions
//! - Slug and hashtag generation from tag labels
//! - Timestamp normalization to zone-aware instants
//! - Output path preparation

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Europe::Prague;
use scraper::{ElementRef, Html};
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::ParseError;

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (on a character boundary) with
/// an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse the text nodes of an element into one line.
///
/// Each text node is trimmed, empty nodes are dropped, and the rest are
/// joined with single spaces.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Flatten an HTML fragment to plain text.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(html_to_text("<p>Uzavírka <b>Seifertovy</b></p>"), "Uzavírka Seifertovy");
/// ```
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    element_text(fragment.root_element())
}

/// Convert a label to a lowercase ASCII slug.
///
/// Diacritics are transliterated, apostrophes dropped, and every other run of
/// non-alphanumeric characters becomes `separator`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("Nová Trojka", "-"), "nova-trojka");
/// assert_eq!(slugify("Nová Trojka", ""), "novatrojka");
/// ```
pub fn slugify(text: &str, separator: &str) -> String {
    deunicode::deunicode(text)
        .to_lowercase()
        .replace(['\'', '"'], "")
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Turn a tag label into a hashtag, e.g. `"Praha 3"` -> `"#praha3"`.
pub fn hashtag(tag: &str) -> String {
    format!("#{}", slugify(tag, ""))
}

/// Capitalize the first character of a string.
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Attach the Europe/Prague zone to a local wall-clock time.
///
/// Ambiguous times (the autumn DST overlap) resolve to the earlier instant;
/// times that do not exist (the spring gap) are an error.
pub fn localize_prague(naive: NaiveDateTime) -> Result<DateTime<FixedOffset>, ParseError> {
    Prague
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| ParseError::Timestamp {
            value: naive.to_string(),
            reason: "does not exist in Europe/Prague".to_string(),
        })
}

/// Local midnight of `date` in Europe/Prague.
pub fn prague_midnight(date: NaiveDate) -> Result<DateTime<FixedOffset>, ParseError> {
    let naive = date.and_hms_opt(0, 0, 0).ok_or_else(|| ParseError::Timestamp {
        value: date.to_string(),
        reason: "no midnight".to_string(),
    })?;
    localize_prague(naive)
}

/// Parse an ISO-8601 timestamp into a zone-aware instant.
///
/// Timestamps with an explicit offset keep it. Naive timestamps are taken as
/// Europe/Prague local time, which is what every naive source here means.
pub fn normalize_timestamp(value: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| ParseError::Timestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    localize_prague(naive)
}

/// Ensure the parent directory of an output file exists.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
        info!(dir = %parent.display(), "Output directory ready");
    }
    Ok(())
}
