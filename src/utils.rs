//! Utility functions for string handling, politeness delays, and file system checks.
//!
//! This module provides helpers used throughout the application:
//! - String truncation for logging and whitespace collapsing for scraped text
//! - File-name sanitizing for per-commodity reports
//! - Randomised delays between page visits
//! - File system validation for output directories

use crate::error::Result;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::fs as stdfs;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped bytes appended. Cuts always land on a character boundary, so
/// Bengali text is safe to pass in.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// Make a commodity name usable as a file name stem.
///
/// Spaces become underscores and anything outside `[A-Za-z0-9_-]` is dropped.
///
/// ```ignore
/// assert_eq!(file_stem("Hilsa Fish"), "Hilsa_Fish");
/// ```
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if stem.is_empty() {
        "commodity".to_string()
    } else {
        stem
    }
}

/// Pick a delay uniformly from `range_ms`. An empty range means no delay.
pub fn jitter(range_ms: &Range<u64>) -> Duration {
    if range_ms.is_empty() {
        return Duration::from_millis(range_ms.start.min(range_ms.end));
    }
    let ms = rand::rng().random_range(range_ms.clone());
    Duration::from_millis(ms)
}

/// Sleep for a random duration from `range_ms`, if it is non-zero.
pub async fn polite_pause(range_ms: &Range<u64>) {
    let delay = jitter(range_ms);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
