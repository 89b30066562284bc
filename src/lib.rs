//! # auditfeed-dl
//!
//! Bulk downloader for a tenant's Office 365 Management Activity feed.
//!
//! A run resolves a time window, lists the content blobs published for one
//! content type inside it, then fetches those blobs with bounded concurrency
//! into either one JSON file per blob or a single NDJSON stream. A blob that
//! fails to download is recorded in the run summary; the other blobs carry on.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use auditfeed_dl::{AuditFetcher, Config, StaticTokenProvider, TimeRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.feed.tenant_id = "00000000-0000-0000-0000-000000000000".to_string();
//!     config.pool.concurrency = 8;
//!
//!     let fetcher = AuditFetcher::new(config, Arc::new(StaticTokenProvider::from_env()?))?;
//!
//!     // Subscribe to events
//!     let mut events = fetcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = fetcher.fetch(&TimeRange::since("1d")).await?;
//!     println!("{}", serde_json::to_string(&summary)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Bearer token acquisition
pub mod auth;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Management Activity API client
pub mod feed;
/// Listing, output sinks and the concurrent fetch pool
pub mod fetcher;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Time window resolution
pub mod window;

// Re-export commonly used types
pub use auth::{StaticTokenProvider, TokenProvider};
pub use config::{Config, FeedConfig, OutputConfig, PoolConfig, RetryConfig};
pub use error::{Error, ErrorDetail, ItemError, Result};
pub use feed::{FeedClient, ManagementApiClient};
pub use fetcher::{AuditFetcher, BlobFetchPool, ContentLister, FileSink, OutputSink, StreamSink};
pub use types::{
    AuditEvent, ContentItem, Event, FetchFailure, RunSummary, Subscription, TimeWindow,
};
pub use window::TimeRange;

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use auditfeed_dl::{AuditFetcher, Config, StaticTokenProvider, TimeRange, cancel_on_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let fetcher = AuditFetcher::new(Config::default(), Arc::new(StaticTokenProvider::from_env()?))?;
///     tokio::spawn(cancel_on_signal(fetcher.cancel_token()));
///
///     let summary = fetcher.fetch(&TimeRange::since("24h")).await?;
///     println!("{} skipped", summary.skipped);
///     Ok(())
/// }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("Stopping: no new blobs will be started");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            // Without a signal source, never cancel
            std::future::pending::<()>().await;
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_on_signal_returns_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_signal(token.clone()));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), watcher)
            .await
            .expect("watcher did not exit")
            .unwrap();
    }
}
