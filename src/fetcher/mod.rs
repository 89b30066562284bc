//! Audit content retrieval: window resolution, listing and concurrent blob fetch.
//!
//! Split into focused submodules:
//! - [`lister`] - Content discovery for a resolved window
//! - [`sink`] - Per-blob files or a single NDJSON stream
//! - [`pool`] - Bounded-concurrency fetch with per-item failure isolation

pub mod lister;
pub mod pool;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_helpers;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{FeedClient, ManagementApiClient};
use crate::types::{ContentItem, Event, RunSummary, Subscription, TimeWindow};
use crate::window::TimeRange;

pub use lister::ContentLister;
pub use pool::BlobFetchPool;
pub use sink::{FileSink, OutputSink, StreamSink};

/// Entry point for listing and fetching a tenant's audit content
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use auditfeed_dl::{AuditFetcher, Config, StaticTokenProvider, TimeRange};
///
/// # async fn example() -> auditfeed_dl::Result<()> {
/// let mut config = Config::default();
/// config.feed.tenant_id = "00000000-0000-0000-0000-000000000000".to_string();
///
/// let fetcher = AuditFetcher::new(config, Arc::new(StaticTokenProvider::from_env()?))?;
/// let summary = fetcher.fetch(&TimeRange::since("24h")).await?;
/// println!("{} blobs, {} records", summary.blobs_downloaded, summary.records_written);
/// # Ok(())
/// # }
/// ```
pub struct AuditFetcher {
    config: Arc<Config>,
    client: Arc<dyn FeedClient>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl AuditFetcher {
    /// Fetcher talking to the management API with tokens from `tokens`
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is invalid, or a network error
    /// if the HTTP client cannot be built.
    pub fn new(config: Config, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        config.validate()?;
        let client = ManagementApiClient::new(&config.feed, tokens)?;
        Self::with_client(config, Arc::new(client))
    }

    /// Fetcher over an arbitrary [`FeedClient`]
    pub fn with_client(config: Config, client: Arc<dyn FeedClient>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(config.pool.event_capacity.max(1));
        Ok(Self {
            config: Arc::new(config),
            client,
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receive run and per-item events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the current and any later run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop taking new items; in-flight fetches are abandoned
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested, abandoning in-flight fetches");
        self.cancel_token.cancel();
    }

    /// Resolve `range` and list the configured content type inside it
    pub async fn list_content(&self, range: &TimeRange) -> Result<(TimeWindow, Vec<ContentItem>)> {
        let window = range.resolve()?;
        let items = self.lister().list(&self.config.feed.content_type, &window).await?;
        Ok((window, items))
    }

    /// Fetch every blob in `range` into the configured output
    pub async fn fetch(&self, range: &TimeRange) -> Result<RunSummary> {
        let sink = self.config.output.build_sink()?;
        self.fetch_into(range, sink).await
    }

    /// Fetch every blob in `range` into `sink`
    ///
    /// Input, auth and listing errors abort before anything is written.
    /// Per-item failures are reported in the returned summary.
    pub async fn fetch_into(&self, range: &TimeRange, sink: OutputSink) -> Result<RunSummary> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (window, items) = self.list_content(range).await?;

        sink.prepare().await?;
        let sink = Arc::new(sink);

        let pool = BlobFetchPool::new(Arc::clone(&self.client), Arc::clone(&sink))
            .with_concurrency(self.config.pool.concurrency)
            .with_retry(self.config.retry.clone())
            .with_events(self.event_tx.clone())
            .with_cancel_token(self.cancel_token.clone());

        tracing::debug!(window = %window, "Fetching listed content");
        let summary = pool.run(items).await;

        if let Err(e) = sink.finish().await {
            tracing::warn!(error = %e, "Failed to flush output");
        }
        Ok(summary)
    }

    /// Subscriptions registered for the tenant
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.client.list_subscriptions().await
    }

    /// Start the subscription for `content_type` (default: the configured type)
    pub async fn start_subscription(&self, content_type: Option<&str>) -> Result<Subscription> {
        let content_type = content_type.unwrap_or(&self.config.feed.content_type);
        let sub = self.client.start_subscription(content_type).await?;
        tracing::info!(content_type, status = %sub.status, "Subscription started");
        Ok(sub)
    }

    fn lister(&self) -> ContentLister {
        ContentLister::new(Arc::clone(&self.client), self.config.retry.clone())
    }
}
