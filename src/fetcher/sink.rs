//! Output sinks for fetched records.
//!
//! A run writes to exactly one [`OutputSink`]:
//! - [`FileSink`] writes one pretty-printed JSON array per blob.
//! - [`StreamSink`] writes newline-delimited JSON to a single shared writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{ItemError, Result};
use crate::types::{AuditEvent, ContentItem};
use crate::utils::blob_base_name;

/// Destination for fetched records, selected once per run
pub enum OutputSink {
    /// One `<name>.json` file per blob
    Files(FileSink),
    /// NDJSON on a single writer
    Stream(StreamSink),
}

impl OutputSink {
    /// Per-blob files under `dir`
    pub fn files(dir: impl Into<PathBuf>) -> Self {
        OutputSink::Files(FileSink::new(dir))
    }

    /// NDJSON written to `writer`
    pub fn stream<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        OutputSink::Stream(StreamSink::new(writer))
    }

    /// Get the sink ready for the first write (creates the output directory)
    pub async fn prepare(&self) -> Result<()> {
        match self {
            OutputSink::Files(files) => files.prepare().await,
            OutputSink::Stream(_) => Ok(()),
        }
    }

    /// Persist all records of one item
    pub async fn write(
        &self,
        item: &ContentItem,
        records: &[AuditEvent],
    ) -> std::result::Result<(), ItemError> {
        match self {
            OutputSink::Files(files) => files.write(item, records).await,
            OutputSink::Stream(stream) => stream.write(records).await,
        }
    }

    /// Flush buffered output at the end of a run
    pub async fn finish(&self) -> Result<()> {
        match self {
            OutputSink::Files(_) => Ok(()),
            OutputSink::Stream(stream) => stream.flush().await,
        }
    }
}

/// Writes each blob to `<dir>/<sanitized name>.json`
///
/// Files are written to a temporary `.part` sibling and renamed into place, so a
/// reader never observes a half-written blob.
pub struct FileSink {
    dir: PathBuf,
    part_seq: AtomicU64,
}

impl FileSink {
    /// Sink writing under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            part_seq: AtomicU64::new(0),
        }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of the file an item is written to
    pub fn path_for(&self, item: &ContentItem) -> std::result::Result<PathBuf, ItemError> {
        let base = blob_base_name(item)?;
        Ok(self.dir.join(format!("{base}.json")))
    }

    async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn write(
        &self,
        item: &ContentItem,
        records: &[AuditEvent],
    ) -> std::result::Result<(), ItemError> {
        let path = self.path_for(item)?;
        let body =
            serde_json::to_vec_pretty(records).map_err(|e| ItemError::SinkWrite(e.to_string()))?;

        // Unique per write so two items mapping to the same name never share a temp file
        let seq = self.part_seq.fetch_add(1, Ordering::Relaxed);
        let part = path.with_extension(format!("json.{seq}.part"));

        if let Err(e) = tokio::fs::write(&part, &body).await {
            return Err(ItemError::SinkWrite(format!(
                "failed to write {}: {}",
                part.display(),
                e
            )));
        }
        if let Err(e) = tokio::fs::rename(&part, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                tracing::warn!(path = %part.display(), error = %cleanup, "Failed to remove partial file");
            }
            return Err(ItemError::SinkWrite(format!(
                "failed to move {} into place: {}",
                path.display(),
                e
            )));
        }

        tracing::debug!(path = %path.display(), records = records.len(), "Wrote blob file");
        Ok(())
    }
}

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Writes records as newline-delimited JSON to one shared writer
///
/// Records of one item are encoded first and then written under the writer lock
/// in a single call, so lines from different items never interleave.
#[derive(Clone)]
pub struct StreamSink {
    writer: SharedWriter,
}

impl StreamSink {
    /// Sink writing to `writer`
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    async fn write(&self, records: &[AuditEvent]) -> std::result::Result<(), ItemError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)
                .map_err(|e| ItemError::SinkWrite(e.to_string()))?;
            buf.push(b'\n');
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&buf)
            .await
            .map_err(|e| ItemError::SinkWrite(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ItemError::SinkWrite(e.to_string()))
    }

    async fn flush(&self) -> Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}
