//! Core types for auditfeed-dl

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorDetail, ItemError};

/// One record inside a content blob.
///
/// Records are opaque documents; they are forwarded to the sink unchanged.
pub type AuditEvent = serde_json::Value;

/// Absolute UTC interval a content listing is scoped to
///
/// Constructed through [`crate::window`], which guarantees `start < end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub(crate) start: DateTime<Utc>,
    pub(crate) end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Window end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the window
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Start as `YYYY-MM-DDTHH:MM:SSZ`
    pub fn start_iso(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// End as `YYYY-MM-DDTHH:MM:SSZ`
    pub fn end_iso(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start_iso(), self.end_iso())
    }
}

/// A content blob advertised by the feed for a window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Absolute URL the blob is fetched from
    pub content_uri: String,

    /// Service-assigned blob identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,

    /// Content type, e.g. "Audit.General"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// When the blob became available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_created: Option<String>,

    /// When the blob stops being retrievable
    #[serde(
        default,
        alias = "expiration",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_expiration: Option<String>,
}

impl ContentItem {
    /// Item with only a URI set
    pub fn new(content_uri: impl Into<String>) -> Self {
        Self {
            content_uri: content_uri.into(),
            content_id: None,
            content_type: None,
            content_created: None,
            content_expiration: None,
        }
    }

    /// Builder-style setter for `content_id`
    pub fn with_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }
}

/// One activity-feed subscription
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscribed content type
    pub content_type: String,

    /// "enabled" or "disabled"
    #[serde(default)]
    pub status: String,

    /// Webhook registration, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<serde_json::Value>,
}

/// Result of processing one item in the pool
#[derive(Debug)]
pub struct FetchOutcome {
    /// The item that was processed
    pub item: ContentItem,
    /// Number of records written, or why the item failed
    pub result: std::result::Result<usize, ItemError>,
}

/// A failed item as reported in the run summary
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    /// URI of the failed blob
    pub content_uri: String,
    /// Blob identifier, when the listing carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    /// What went wrong
    pub error: ErrorDetail,
}

/// Whole-run summary returned once the fetch pool drains
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Items whose records were fully written
    #[serde(rename = "blobs")]
    pub blobs_downloaded: u64,
    /// Records written across successful items
    #[serde(rename = "records")]
    pub records_written: u64,
    /// Items that failed, in completion order
    pub failures: Vec<FetchFailure>,
    /// Items never finished because the run was cancelled
    #[serde(skip_serializing_if = "is_zero")]
    pub skipped: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl RunSummary {
    /// Fold per-item outcomes into a summary
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = FetchOutcome>, skipped: u64) -> Self {
        let mut summary = RunSummary {
            skipped,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.result {
                Ok(records) => {
                    summary.blobs_downloaded += 1;
                    summary.records_written += records as u64;
                }
                Err(e) => summary.failures.push(FetchFailure {
                    content_uri: outcome.item.content_uri,
                    content_id: outcome.item.content_id,
                    error: ErrorDetail::from(&e),
                }),
            }
        }
        summary
    }

    /// Number of failed items
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Event emitted during a fetch run
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Pool started
    RunStarted {
        /// Items queued
        items: usize,
        /// Workers spawned
        concurrency: usize,
    },

    /// One item's records reached the sink
    ItemWritten {
        /// URI of the blob
        content_uri: String,
        /// Records written
        records: usize,
    },

    /// One item failed; the run continues
    ItemFailed {
        /// URI of the blob
        content_uri: String,
        /// What went wrong
        error: ErrorDetail,
    },

    /// Pool drained
    RunComplete {
        /// Successful items
        blobs: u64,
        /// Records written
        records: u64,
        /// Failed items
        failed: usize,
    },
}
