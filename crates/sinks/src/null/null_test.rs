//! Tests for the null backend

use std::sync::Arc;

use serde_json::json;
use transfer_config::{GlobalConfig, PipelineConfig, ResultTableConfig};
use transfer_pipeline::{Backend, BuildScope, kill_channel};
use transfer_protocol::{Payload, PayloadFlag};

use super::NullBackend;

#[tokio::test]
async fn test_counts_and_discards() {
    let backend = NullBackend::new("null");
    let (kill, _kill_rx) = kill_channel(1);
    let payload = Payload::from_value(&json!({"a": 1}), PayloadFlag::NONE).unwrap();
    let size = payload.len() as u64;

    backend.push(payload.clone(), &kill).await;
    backend.push(payload, &kill).await;

    let metrics = backend.metrics();
    assert_eq!(metrics.payloads_received(), 2);
    assert_eq!(metrics.bytes_received(), 2 * size);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let backend = NullBackend::new("null");
    assert!(!backend.is_closed());

    backend.close().await.unwrap();
    backend.close().await.unwrap();
    assert!(backend.is_closed());
}

#[test]
fn test_named_after_result_table() {
    assert_eq!(NullBackend::from_scope(&BuildScope::detached()).to_string(), "null");

    let scope = BuildScope::new(Arc::new(GlobalConfig::default()), PipelineConfig::new(1))
        .for_result_table(Arc::new(ResultTableConfig::new("cpu_summary")));
    assert_eq!(NullBackend::from_scope(&scope).to_string(), "null:cpu_summary");
}
