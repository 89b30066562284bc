//! Utility functions for output naming

use crate::error::ItemError;
use crate::types::ContentItem;

/// Maximum length of a sanitized file name (before the `.json` extension)
pub const MAX_FILENAME_LEN: usize = 200;

/// Map an arbitrary identifier to a filesystem-safe name
///
/// Every run of characters outside `[A-Za-z0-9._-]` collapses into a single `_`,
/// then the result is cut to [`MAX_FILENAME_LEN`] characters. The output only
/// contains allowed characters, so sanitizing twice changes nothing.
///
/// # Examples
///
/// ```
/// use auditfeed_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("a b//c"), "a_b_c");
/// assert_eq!(sanitize_filename("2024$abc.json"), "2024_abc.json");
/// ```
pub fn sanitize_filename(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_FILENAME_LEN));
    let mut in_run = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    // All characters are ASCII, so byte truncation lands on a char boundary
    out.truncate(MAX_FILENAME_LEN);
    out
}

/// Last path segment of a content URI, as it appears in the URL (still percent-encoded)
pub fn uri_basename(content_uri: &str) -> Result<String, ItemError> {
    let url = url::Url::parse(content_uri).map_err(|e| ItemError::InvalidUri {
        uri: content_uri.to_string(),
        reason: e.to_string(),
    })?;
    Ok(url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string())
}

/// Base file name (without extension) used when an item is written to disk
///
/// Prefers the item's `content_id`; falls back to the URI's last path segment.
pub fn blob_base_name(item: &ContentItem) -> Result<String, ItemError> {
    match item.content_id.as_deref() {
        Some(id) if !id.is_empty() => Ok(sanitize_filename(id)),
        _ => Ok(sanitize_filename(&uri_basename(&item.content_uri)?)),
    }
}
