//! Shared test doubles for the fetch pipeline.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWrite;

use crate::error::{Error, ItemError, Result};
use crate::feed::FeedClient;
use crate::types::{AuditEvent, ContentItem, Subscription, TimeWindow};

/// How a mocked blob answers `fetch_blob`
#[derive(Clone)]
enum BlobBehavior {
    Records(Vec<AuditEvent>),
    Status(u16),
    Undecodable,
    /// Fails with 503 this many times, then returns the records
    Flaky(usize, Vec<AuditEvent>),
    Hang,
}

/// In-memory [`FeedClient`] with scripted per-blob behavior
#[derive(Default)]
pub(crate) struct MockFeedClient {
    items: Vec<ContentItem>,
    blobs: HashMap<String, BlobBehavior>,
    list_failure: Option<(u16, usize)>,
    fetch_delay: Option<Duration>,
    subscriptions: Vec<Subscription>,
    list_calls: AtomicUsize,
    fetch_calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<String>>,
}

/// Deterministic records for a blob: `{"Id": "<uri>#<n>", "Seq": n}`
pub(crate) fn records_for(uri: &str, count: usize) -> Vec<AuditEvent> {
    (0..count)
        .map(|n| json!({"Id": format!("{uri}#{n}"), "Seq": n, "Operation": "DlpRuleMatch"}))
        .collect()
}

impl MockFeedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(mut self, item: ContentItem, behavior: BlobBehavior) -> Self {
        self.blobs.insert(item.content_uri.clone(), behavior);
        self.items.push(item);
        self
    }

    /// Listed blob returning `count` records
    pub(crate) fn with_blob(self, uri: &str, count: usize) -> Self {
        self.push(
            ContentItem::new(uri),
            BlobBehavior::Records(records_for(uri, count)),
        )
    }

    /// Listed item (keeps its id) returning `count` records
    pub(crate) fn with_item(self, item: ContentItem, count: usize) -> Self {
        let records = records_for(&item.content_uri, count);
        self.push(item, BlobBehavior::Records(records))
    }

    /// Listed blob that always answers with `status`
    pub(crate) fn with_failing_blob(self, uri: &str, status: u16) -> Self {
        self.push(ContentItem::new(uri), BlobBehavior::Status(status))
    }

    /// Listed blob whose body is not a record array
    pub(crate) fn with_undecodable_blob(self, uri: &str) -> Self {
        self.push(ContentItem::new(uri), BlobBehavior::Undecodable)
    }

    /// Listed blob that fails with 503 `failures` times before succeeding
    pub(crate) fn with_flaky_blob(self, uri: &str, count: usize, failures: usize) -> Self {
        self.push(
            ContentItem::new(uri),
            BlobBehavior::Flaky(failures, records_for(uri, count)),
        )
    }

    /// Listed blob whose fetch never completes
    pub(crate) fn with_hanging_blob(self, uri: &str) -> Self {
        self.push(ContentItem::new(uri), BlobBehavior::Hang)
    }

    /// Listing fails with `status`; `times == 0` means every call fails
    pub(crate) fn with_list_failure(mut self, status: u16, times: usize) -> Self {
        self.list_failure = Some((status, times));
        self
    }

    /// Sleep this long inside every fetch
    pub(crate) fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub(crate) fn with_subscription(mut self, content_type: &str, status: &str) -> Self {
        self.subscriptions.push(Subscription {
            content_type: content_type.to_string(),
            status: status.to_string(),
            webhook: None,
        });
        self
    }

    pub(crate) fn items(&self) -> Vec<ContentItem> {
        self.items.clone()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self, uri: &str) -> usize {
        self.fetch_calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(uri)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_fetch_calls(&self) -> usize {
        self.fetch_calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .sum()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn started(&self) -> Vec<String> {
        self.started.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn answer(&self, uri: &str, attempt: usize) -> std::result::Result<Vec<AuditEvent>, ItemError> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        match self.blobs.get(uri).cloned() {
            None => Err(ItemError::Fetch {
                status: 404,
                message: "Not Found".to_string(),
            }),
            Some(BlobBehavior::Records(records)) => Ok(records),
            Some(BlobBehavior::Status(status)) => Err(ItemError::Fetch {
                status,
                message: "scripted failure".to_string(),
            }),
            Some(BlobBehavior::Undecodable) => {
                Err(ItemError::Decode("expected an array, got a string".to_string()))
            }
            Some(BlobBehavior::Flaky(failures, records)) => {
                if attempt <= failures {
                    Err(ItemError::Fetch {
                        status: 503,
                        message: "Service Unavailable".to_string(),
                    })
                } else {
                    Ok(records)
                }
            }
            Some(BlobBehavior::Hang) => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl FeedClient for MockFeedClient {
    async fn list_content(
        &self,
        _content_type: &str,
        _window: &TimeWindow,
    ) -> Result<Vec<ContentItem>> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((status, times)) = self.list_failure
            && (times == 0 || call <= times)
        {
            return Err(Error::RemoteList {
                status,
                message: "scripted failure".to_string(),
            });
        }
        Ok(self.items.clone())
    }

    async fn fetch_blob(
        &self,
        content_uri: &str,
    ) -> std::result::Result<Vec<AuditEvent>, ItemError> {
        let attempt = {
            let mut calls = self.fetch_calls.lock().unwrap_or_else(|p| p.into_inner());
            let n = calls.entry(content_uri.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.answer(content_uri, attempt).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.clone())
    }

    async fn start_subscription(&self, content_type: &str) -> Result<Subscription> {
        self.started
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(content_type.to_string());
        Ok(Subscription {
            content_type: content_type.to_string(),
            status: "enabled".to_string(),
            webhook: None,
        })
    }
}

/// Writer capturing bytes in memory
///
/// Accepts at most `chunk` bytes per call and yields every other call, so an
/// unserialized writer would interleave lines from concurrent items.
#[derive(Clone)]
pub(crate) struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
    chunk: usize,
    yield_next: bool,
}

impl SharedBuffer {
    pub(crate) fn new() -> Self {
        Self {
            bytes: Arc::new(Mutex::new(Vec::new())),
            chunk: 7,
            yield_next: false,
        }
    }

    pub(crate) fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.yield_next {
            self.yield_next = false;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.yield_next = true;
        let n = buf.len().min(self.chunk);
        self.bytes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Writer that rejects every write
pub(crate) struct FailingWriter;

impl AsyncWrite for FailingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
