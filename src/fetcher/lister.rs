//! Content discovery for a resolved time window.

use std::sync::Arc;

use crate::config::RetryConfig;
use crate::error::Result;
use crate::feed::FeedClient;
use crate::retry::fetch_with_retry;
use crate::types::{ContentItem, TimeWindow};

/// Lists the content blobs available for a content type and window
pub struct ContentLister {
    client: Arc<dyn FeedClient>,
    retry: RetryConfig,
}

impl ContentLister {
    /// Lister over `client`; throttling and 5xx responses are retried per `retry`
    pub fn new(client: Arc<dyn FeedClient>, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Items in the order the feed returned them
    ///
    /// # Errors
    /// [`Error::RemoteList`](crate::Error::RemoteList) when the feed answers with a
    /// non-success status after retries; [`Error::Auth`](crate::Error::Auth) when no
    /// token could be obtained.
    pub async fn list(&self, content_type: &str, window: &TimeWindow) -> Result<Vec<ContentItem>> {
        let items = fetch_with_retry(&self.retry, || {
            self.client.list_content(content_type, window)
        })
        .await
        .inspect_err(|e| {
            tracing::error!(content_type, window = %window, error = %e, "Failed to list content");
        })?;

        tracing::info!(
            content_type,
            window = %window,
            items = items.len(),
            "Listed available content"
        );
        Ok(items)
    }
}
