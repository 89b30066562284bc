//! Error types for auditfeed-dl
//!
//! Errors fall into two groups:
//! - [`Error`] covers failures that abort a whole run (bad input, auth, listing).
//! - [`ItemError`] covers failures isolated to one content blob. The fetch pool
//!   records them per item and keeps going.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for auditfeed-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for auditfeed-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output.out_dir")
        key: Option<String>,
    },

    /// Relative duration has no usable `<n><d|h|m>` segments or sums to zero
    #[error("invalid duration {0:?}: expected segments like 7d, 24h, 90m or 1d2h")]
    InvalidDuration(String),

    /// Neither a relative duration nor a complete start/end pair was supplied
    #[error("missing time range: provide --since <duration> (e.g., 24h) or both --start and --end")]
    MissingTimeRange,

    /// Explicit timestamp could not be parsed as RFC 3339
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The raw value supplied by the caller
        value: String,
        /// Parser message
        reason: String,
    },

    /// Explicit window does not satisfy `start < end`
    #[error("invalid time range: start {start} is not before end {end}")]
    InvalidTimeRange {
        /// Requested start
        start: String,
        /// Requested end
        end: String,
    },

    /// Token acquisition failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// The feed refused to list content (fatal for the run)
    #[error("list content failed: {status} {message}")]
    RemoteList {
        /// HTTP status code returned by the feed
        status: u16,
        /// Status text or response body excerpt
        message: String,
    },

    /// A subscription management call returned a non-success status
    #[error("{operation} failed: {status} {message}")]
    Remote {
        /// Which call failed (e.g., "list subscriptions")
        operation: &'static str,
        /// HTTP status code returned by the feed
        status: u16,
        /// Status text or response body excerpt
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Run was cancelled before it could start
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Failure of a single content item inside a fetch run.
///
/// None of these abort the run; the pool records them and moves on.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The blob endpoint answered with a non-success status
    #[error("fetch blob failed: {status} {message}")]
    Fetch {
        /// HTTP status code
        status: u16,
        /// Status text or response body excerpt
        message: String,
    },

    /// Connection, timeout, or other transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Blob body was not a record array (bare or wrapped in `value`)
    #[error("decode error: {0}")]
    Decode(String),

    /// `contentUri` could not be parsed as an absolute URL
    #[error("invalid content URI {uri:?}: {reason}")]
    InvalidUri {
        /// The offending URI
        uri: String,
        /// Parser message
        reason: String,
    },

    /// The sink could not persist this item's records
    #[error("sink write failed: {0}")]
    SinkWrite(String),

    /// Token acquisition failed for this request
    #[error("authentication error: {0}")]
    Auth(String),

    /// Any other failure raised while handling the item; never retried
    #[error("{0}")]
    Aborted(String),
}

impl ItemError {
    /// Stable machine-readable code, used in summaries and events
    pub fn code(&self) -> &'static str {
        match self {
            ItemError::Fetch { .. } => "fetch_failed",
            ItemError::Transport(_) => "transport_error",
            ItemError::Decode(_) => "decode_error",
            ItemError::InvalidUri { .. } => "invalid_uri",
            ItemError::SinkWrite(_) => "sink_write_failed",
            ItemError::Auth(_) => "auth_error",
            ItemError::Aborted(_) => "aborted",
        }
    }
}

impl From<reqwest::Error> for ItemError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ItemError::Decode(e.to_string())
        } else {
            ItemError::Transport(e.to_string())
        }
    }
}

impl From<Error> for ItemError {
    fn from(e: Error) -> Self {
        match e {
            Error::Auth(msg) => ItemError::Auth(msg),
            Error::Decode(msg) => ItemError::Decode(msg),
            Error::Serialization(e) => ItemError::Decode(e.to_string()),
            Error::Network(e) => ItemError::from(e),
            Error::Io(e) => ItemError::SinkWrite(e.to_string()),
            Error::RemoteList { status, message } | Error::Remote { status, message, .. } => {
                ItemError::Fetch { status, message }
            }
            other => ItemError::Aborted(other.to_string()),
        }
    }
}

/// Serializable view of an [`ItemError`] for summaries and events
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "fetch_failed")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&ItemError> for ErrorDetail {
    fn from(e: &ItemError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}
