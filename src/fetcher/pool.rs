//! Bounded-concurrency blob fetch pool.
//!
//! A fixed number of workers drain one shared FIFO queue of [`ContentItem`]s.
//! Each item is popped exactly once, fetched (with retry), written to the sink,
//! and reported. Per-item failures are recorded and never stop other items.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{ErrorDetail, ItemError};
use crate::feed::FeedClient;
use crate::retry::fetch_with_retry;
use crate::types::{AuditEvent, ContentItem, Event, FetchOutcome, RunSummary};

use super::sink::OutputSink;

/// Workers actually spawned for `items` queued items
///
/// Never more workers than items, never fewer than one.
pub fn effective_concurrency(requested: usize, items: usize) -> usize {
    requested.min(items).max(1)
}

/// Shared FIFO work queue; the lock is only held to pop one item
struct WorkQueue {
    items: Mutex<VecDeque<ContentItem>>,
}

impl WorkQueue {
    fn new(items: Vec<ContentItem>) -> Self {
        Self {
            items: Mutex::new(items.into()),
        }
    }

    fn pop(&self) -> Option<ContentItem> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

/// Live counters, updated by workers as items finish
#[derive(Default)]
struct PoolCounters {
    written: AtomicU64,
    records: AtomicU64,
    failed: AtomicU64,
}

impl PoolCounters {
    fn finished(&self) -> u64 {
        self.written.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed)
    }
}

/// Everything a worker needs, cloned once per worker
#[derive(Clone)]
struct WorkerContext {
    queue: Arc<WorkQueue>,
    counters: Arc<PoolCounters>,
    client: Arc<dyn FeedClient>,
    sink: Arc<OutputSink>,
    retry: RetryConfig,
    event_tx: Option<broadcast::Sender<Event>>,
    cancel_token: CancellationToken,
    total: usize,
}

/// Fetches content blobs with bounded parallelism
pub struct BlobFetchPool {
    client: Arc<dyn FeedClient>,
    sink: Arc<OutputSink>,
    concurrency: usize,
    retry: RetryConfig,
    event_tx: Option<broadcast::Sender<Event>>,
    cancel_token: CancellationToken,
}

impl BlobFetchPool {
    /// Pool fetching through `client` into `sink`, one worker, no retries
    pub fn new(client: Arc<dyn FeedClient>, sink: Arc<OutputSink>) -> Self {
        Self {
            client,
            sink,
            concurrency: 1,
            retry: RetryConfig::disabled(),
            event_tx: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Requested number of workers (clamped per run)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Retry policy applied to each blob fetch
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Broadcast per-item events on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Stop taking new items and abandon in-flight fetches when `token` fires
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Process every item and return the aggregate
    ///
    /// Returns once the queue is empty and every worker has finished its
    /// in-flight item. Items left unfinished by cancellation count as skipped.
    pub async fn run(&self, items: Vec<ContentItem>) -> RunSummary {
        let total = items.len();
        let workers = effective_concurrency(self.concurrency, total);

        let ctx = WorkerContext {
            queue: Arc::new(WorkQueue::new(items)),
            counters: Arc::new(PoolCounters::default()),
            client: Arc::clone(&self.client),
            sink: Arc::clone(&self.sink),
            retry: self.retry.clone(),
            event_tx: self.event_tx.clone(),
            cancel_token: self.cancel_token.clone(),
            total,
        };

        tracing::info!(items = total, workers, "Starting blob fetch");
        ctx.emit(Event::RunStarted {
            items: total,
            concurrency: workers,
        });

        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(worker_loop(worker, ctx.clone()));
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(mut finished) => outcomes.append(&mut finished),
                Err(e) => tracing::error!(error = %e, "Fetch worker panicked"),
            }
        }

        let skipped = (total - outcomes.len()) as u64;
        let summary = RunSummary::from_outcomes(outcomes, skipped);

        if skipped > 0 {
            tracing::warn!(skipped, "Blob fetch stopped before the queue drained");
        }
        tracing::info!(
            blobs = summary.blobs_downloaded,
            records = summary.records_written,
            failed = summary.failed(),
            "Blob fetch complete"
        );
        ctx.emit(Event::RunComplete {
            blobs: summary.blobs_downloaded,
            records: summary.records_written,
            failed: summary.failed(),
        });

        summary
    }
}

async fn worker_loop(worker: usize, ctx: WorkerContext) -> Vec<FetchOutcome> {
    let mut outcomes = Vec::new();

    while !ctx.cancel_token.is_cancelled() {
        let Some(item) = ctx.queue.pop() else {
            break;
        };
        tracing::debug!(worker, content_uri = %item.content_uri, "Fetching blob");

        let fetched = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => {
                tracing::debug!(worker, content_uri = %item.content_uri, "Abandoning in-flight fetch");
                break;
            }
            fetched = ctx.fetch(&item) => fetched,
        };

        // Writes are not raced against cancellation so outputs stay whole
        let result = match fetched {
            Ok(records) => ctx
                .sink
                .write(&item, &records)
                .await
                .map(|()| records.len()),
            Err(e) => Err(e),
        };

        ctx.report(&item, &result);
        outcomes.push(FetchOutcome { item, result });
    }

    outcomes
}

impl WorkerContext {
    async fn fetch(&self, item: &ContentItem) -> Result<Vec<AuditEvent>, ItemError> {
        url::Url::parse(&item.content_uri).map_err(|e| ItemError::InvalidUri {
            uri: item.content_uri.clone(),
            reason: e.to_string(),
        })?;
        fetch_with_retry(&self.retry, || self.client.fetch_blob(&item.content_uri)).await
    }

    fn report(&self, item: &ContentItem, result: &Result<usize, ItemError>) {
        match result {
            Ok(records) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                let records_so_far = self
                    .counters
                    .records
                    .fetch_add(*records as u64, Ordering::Relaxed)
                    + *records as u64;
                tracing::debug!(
                    content_uri = %item.content_uri,
                    records,
                    records_so_far,
                    done = self.counters.finished(),
                    total = self.total,
                    "Blob written"
                );
                self.emit(Event::ItemWritten {
                    content_uri: item.content_uri.clone(),
                    records: *records,
                });
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    content_uri = %item.content_uri,
                    content_id = item.content_id.as_deref().unwrap_or(""),
                    error = %e,
                    done = self.counters.finished(),
                    total = self.total,
                    "Failed to fetch blob"
                );
                self.emit(Event::ItemFailed {
                    content_uri: item.content_uri.clone(),
                    error: ErrorDetail::from(e),
                });
            }
        }
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            tx.send(event).ok();
        }
    }
}
