use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use crate::error::ItemError;
use crate::fetcher::pool::BlobFetchPool;
use crate::fetcher::sink::{FileSink, OutputSink};
use crate::fetcher::test_helpers::{FailingWriter, MockFeedClient, SharedBuffer, records_for};
use crate::types::ContentItem;

fn uri(n: usize) -> String {
    format!("https://blobs.test/feed/audit/blob{n}")
}

fn json_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_file_sink_names_by_content_id() {
    let tmp = TempDir::new().unwrap();
    let sink = OutputSink::files(tmp.path());
    let item = ContentItem::new(uri(0)).with_id("20240101$abc/def");
    let records = records_for(&item.content_uri, 3);

    sink.write(&item, &records).await.unwrap();

    assert_eq!(json_files(tmp.path()), ["20240101_abc_def.json"]);
    let body = std::fs::read_to_string(tmp.path().join("20240101_abc_def.json")).unwrap();
    let parsed: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed, Value::Array(records));
}

#[tokio::test]
async fn test_file_sink_falls_back_to_uri_basename() {
    let tmp = TempDir::new().unwrap();
    let sink = FileSink::new(tmp.path());
    let item = ContentItem::new("https://blobs.test/feed/audit/20240101-blob.42?sig=x");

    let path = sink.path_for(&item).unwrap();
    assert_eq!(path, tmp.path().join("20240101-blob.42.json"));
    assert_eq!(sink.dir(), tmp.path());
}

#[tokio::test]
async fn test_file_sink_overwrites_existing_file() {
    let tmp = TempDir::new().unwrap();
    let sink = OutputSink::files(tmp.path());
    let item = ContentItem::new(uri(0)).with_id("blob");

    sink.write(&item, &records_for("old", 5)).await.unwrap();
    sink.write(&item, &records_for("new", 1)).await.unwrap();

    let body = std::fs::read_to_string(tmp.path().join("blob.json")).unwrap();
    let parsed: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed, records_for("new", 1));
}

#[tokio::test]
async fn test_file_sink_empty_blob_writes_empty_array() {
    let tmp = TempDir::new().unwrap();
    let sink = OutputSink::files(tmp.path());
    let item = ContentItem::new(uri(0)).with_id("empty");

    sink.write(&item, &[]).await.unwrap();

    let body = std::fs::read_to_string(tmp.path().join("empty.json")).unwrap();
    let parsed: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert!(parsed.is_empty());
}

#[tokio::test]
async fn test_prepare_creates_nested_directory() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("a").join("b");
    let sink = OutputSink::files(&dir);

    sink.prepare().await.unwrap();
    sink.write(&ContentItem::new(uri(1)), &records_for("x", 1))
        .await
        .unwrap();

    assert_eq!(json_files(&dir), ["blob1.json"]);
}

#[tokio::test]
async fn test_write_into_missing_directory_is_item_error() {
    let tmp = TempDir::new().unwrap();
    let sink = OutputSink::files(tmp.path().join("missing"));

    let err = sink
        .write(&ContentItem::new(uri(0)), &records_for("x", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ItemError::SinkWrite(_)));
    assert_eq!(err.code(), "sink_write_failed");
}

#[tokio::test]
async fn test_pool_leaves_one_file_per_success_and_no_partials() {
    let tmp = TempDir::new().unwrap();
    let client = Arc::new(
        MockFeedClient::new()
            .with_item(ContentItem::new(uri(0)).with_id("first"), 2)
            .with_failing_blob(&uri(1), 500)
            .with_item(ContentItem::new(uri(2)).with_id("third"), 4)
            .with_blob(&uri(3), 1)
            .with_fetch_delay(Duration::from_millis(5)),
    );
    let sink = Arc::new(OutputSink::files(tmp.path()));
    sink.prepare().await.unwrap();

    let summary = BlobFetchPool::new(client.clone(), sink)
        .with_concurrency(3)
        .run(client.items())
        .await;

    assert_eq!(summary.blobs_downloaded, 3);
    assert_eq!(summary.records_written, 7);
    assert_eq!(json_files(tmp.path()), ["blob3.json", "first.json", "third.json"]);
    for name in json_files(tmp.path()) {
        assert!(!name.ends_with(".part"), "partial file left behind: {name}");
    }
}

#[tokio::test]
async fn test_stream_sink_writes_one_line_per_record() {
    let buffer = SharedBuffer::new();
    let sink = OutputSink::stream(buffer.clone());
    let records = records_for("blob", 3);

    sink.write(&ContentItem::new(uri(0)), &records).await.unwrap();
    sink.write(&ContentItem::new(uri(1)), &[]).await.unwrap();
    sink.finish().await.unwrap();

    let out = buffer.contents();
    assert!(out.ends_with('\n'));
    let lines: Vec<Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines, records);
}

#[tokio::test]
async fn test_stream_lines_never_interleave_under_concurrency() {
    let items = 16;
    let per_item = 6;
    let client = Arc::new((0..items).fold(MockFeedClient::new(), |c, i| {
        c.with_blob(&uri(i), per_item)
    }));
    let buffer = SharedBuffer::new();
    let sink = Arc::new(OutputSink::stream(buffer.clone()));

    let summary = BlobFetchPool::new(client.clone(), sink.clone())
        .with_concurrency(8)
        .run(client.items())
        .await;
    sink.finish().await.unwrap();

    let out = buffer.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len() as u64, summary.records_written);
    assert_eq!(lines.len(), items * per_item);

    let mut seen = HashSet::new();
    let mut last_blob: Option<String> = None;
    let mut run_len = 0;
    for line in lines {
        let record: Value = serde_json::from_str(line).unwrap();
        let id = record["Id"].as_str().unwrap().to_string();
        assert!(seen.insert(id.clone()), "duplicate record {id}");

        // records of one blob are contiguous
        let blob = id.split('#').next().unwrap().to_string();
        if last_blob.as_deref() == Some(blob.as_str()) {
            run_len += 1;
        } else {
            if last_blob.is_some() {
                assert_eq!(run_len, per_item);
            }
            last_blob = Some(blob);
            run_len = 1;
        }
    }
    assert_eq!(run_len, per_item);
}

#[tokio::test]
async fn test_broken_stream_fails_items_not_run() {
    let client = Arc::new(
        MockFeedClient::new()
            .with_blob(&uri(0), 2)
            .with_blob(&uri(1), 1),
    );
    let sink = Arc::new(OutputSink::stream(FailingWriter));

    let summary = BlobFetchPool::new(client.clone(), sink)
        .with_concurrency(2)
        .run(client.items())
        .await;

    assert_eq!(summary.blobs_downloaded, 0);
    assert_eq!(summary.records_written, 0);
    assert_eq!(summary.failed(), 2);
    assert!(
        summary
            .failures
            .iter()
            .all(|f| f.error.code == "sink_write_failed")
    );
}
