//! Tests for the file backend

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use transfer_config::{GlobalConfig, Options, PipelineConfig, ResultTableConfig, ShipperConfig};
use transfer_pipeline::{BuildScope, BulkHandler, CancellationToken, PipelineError, kill_channel};
use transfer_protocol::{Payload, PayloadFlag};

use super::{FileConfig, FileHandler};

async fn lines_of(handler: &FileHandler, values: &[serde_json::Value]) -> Vec<String> {
    let (kill, _kill_rx) = kill_channel(1);
    let cancel = CancellationToken::new();
    let mut lines = Vec::new();
    for value in values {
        let payload = Payload::from_value(value, PayloadFlag::NONE).unwrap();
        if let Some((line, _)) = handler.handle(&payload, &kill, &cancel).await {
            lines.push(line);
        }
    }
    lines
}

// =============================================================================
// Config
// =============================================================================

#[test]
fn test_config_requires_path() {
    let err = FileConfig::from_options(&Options::new(), "cpu").unwrap_err();
    assert!(matches!(err, PipelineError::Build(_)));

    let empty = Options::new().with("path", "");
    assert!(FileConfig::from_options(&empty, "cpu").is_err());
}

#[test]
fn test_config_expands_table() {
    let options = Options::new()
        .with("path", "/data/{table}.jsonl")
        .with("buffer_size", 1024);
    let config = FileConfig::from_options(&options, "cpu_summary").unwrap();
    assert_eq!(config.path.to_str(), Some("/data/cpu_summary.jsonl"));
    assert_eq!(config.buffer_size, 1024);
}

#[test]
fn test_from_scope() {
    let shipper = ShipperConfig::new("file").with_storage_option("path", "/tmp/{table}.out");
    let scope = BuildScope::new(Arc::new(GlobalConfig::default()), PipelineConfig::new(1))
        .for_result_table(Arc::new(ResultTableConfig::new("mem")))
        .for_shipper(Arc::new(shipper));

    let handler = FileHandler::from_scope(&scope).unwrap();
    assert_eq!(handler.to_string(), "file:/tmp/mem.out");

    assert!(FileHandler::from_scope(&BuildScope::detached()).is_err());
}

// =============================================================================
// Writing
// =============================================================================

#[tokio::test]
async fn test_flush_appends_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("out.jsonl");
    let handler = FileHandler::new(FileConfig::new(&path));
    let cancel = CancellationToken::new();

    let first = lines_of(&handler, &[json!({"i": 0}), json!({"i": 1})]).await;
    assert_eq!(handler.flush(&first, &cancel).await.unwrap(), 2);
    let second = lines_of(&handler, &[json!({"i": 2})]).await;
    assert_eq!(handler.flush(&second, &cancel).await.unwrap(), 1);
    handler.close().await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "{\"i\":0}\n{\"i\":1}\n{\"i\":2}\n");

    let snapshot = handler.metrics().snapshot();
    assert_eq!(snapshot.records_written, 3);
    assert_eq!(snapshot.flush_count, 2);
    assert_eq!(snapshot.bytes_written, content.len() as u64);
}

#[tokio::test]
async fn test_existing_file_kept() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.jsonl");
    std::fs::write(&path, "old\n").unwrap();

    let handler = FileHandler::new(FileConfig::new(&path));
    let lines = lines_of(&handler, &[json!({"i": 0})]).await;
    handler.flush(&lines, &CancellationToken::new()).await.unwrap();
    handler.close().await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\n{\"i\":0}\n");
}

#[tokio::test]
async fn test_close_without_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never.jsonl");
    let handler = FileHandler::new(FileConfig::new(&path));

    handler.close().await.unwrap();
    handler.close().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_unwritable_path_fails_flush() {
    let dir = TempDir::new().unwrap();
    // a directory cannot be opened for append
    let handler = FileHandler::new(FileConfig::new(dir.path()));

    let err = handler
        .flush(&["{}".to_string()], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Flush(_)));
    assert_eq!(handler.metrics().snapshot().write_errors, 1);
}

#[tokio::test]
async fn test_record_fields_applied() {
    let dir = TempDir::new().unwrap();
    let handler = FileHandler::new(FileConfig::new(dir.path().join("out.jsonl")));
    handler.set_record_fields(transfer_config::RecordFields {
        metrics: vec!["usage".into()],
        ..Default::default()
    });

    let lines = lines_of(
        &handler,
        &[json!({"dimensions": {"host": "a"}, "metrics": {"usage": 1, "idle": 2}})],
    )
    .await;
    assert_eq!(
        lines,
        vec!["{\"dimensions\":{\"host\":\"a\"},\"metrics\":{\"usage\":1}}"]
    );
}
