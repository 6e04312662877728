//! Tests for the stdout backend

use serde_json::json;
use transfer_config::{Options, RecordFields};
use transfer_pipeline::{BulkHandler, CancellationToken, kill_channel};
use transfer_protocol::{Payload, PayloadFlag};

use super::{StdoutConfig, StdoutHandler};

fn handler(config: StdoutConfig) -> StdoutHandler<Vec<u8>> {
    StdoutHandler::with_writer("cpu", config, Vec::new())
}

async fn lines_of(handler: &StdoutHandler<Vec<u8>>, values: &[serde_json::Value]) -> Vec<String> {
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

async fn written(handler: &StdoutHandler<Vec<u8>>) -> String {
    String::from_utf8(handler.writer.lock().await.clone()).unwrap()
}

#[test]
fn test_config_from_options() {
    assert!(!StdoutConfig::from_options(&Options::new()).unwrap().show_table);
    let options = Options::new().with("show_table", true);
    assert!(StdoutConfig::from_options(&options).unwrap().show_table);
}

#[test]
fn test_display() {
    assert_eq!(handler(StdoutConfig::default()).to_string(), "stdout:cpu");
    let unnamed = StdoutHandler::with_writer("", StdoutConfig::default(), Vec::new());
    assert_eq!(unnamed.to_string(), "stdout");
}

#[tokio::test]
async fn test_flush_writes_lines() {
    let handler = handler(StdoutConfig::default());
    let lines = lines_of(&handler, &[json!({"i": 0}), json!({"i": 1})]).await;

    let count = handler
        .flush(&lines, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(written(&handler).await, "{\"i\":0}\n{\"i\":1}\n");

    let snapshot = handler.metrics().snapshot();
    assert_eq!(snapshot.records_written, 2);
    assert_eq!(snapshot.flush_count, 1);
    handler.close().await.unwrap();
}

#[tokio::test]
async fn test_table_prefix() {
    let handler = handler(StdoutConfig { show_table: true });
    let lines = lines_of(&handler, &[json!({"i": 0})]).await;
    assert_eq!(lines, vec!["cpu\t{\"i\":0}"]);
}

#[tokio::test]
async fn test_record_fields_applied() {
    let handler = handler(StdoutConfig::default());
    handler.set_record_fields(RecordFields {
        dimensions: vec!["host".into()],
        ..RecordFields::default()
    });

    let lines = lines_of(&handler, &[json!({"host": "a", "secret": "x"})]).await;
    assert_eq!(lines, vec!["{\"host\":\"a\"}"]);
}

#[tokio::test]
async fn test_invalid_payload_skipped() {
    let handler = handler(StdoutConfig::default());
    let (kill, _kill_rx) = kill_channel(1);
    let payload = Payload::from_bytes("not json", PayloadFlag::NONE);

    let result = handler
        .handle(&payload, &kill, &CancellationToken::new())
        .await;
    assert!(result.is_none());
}
