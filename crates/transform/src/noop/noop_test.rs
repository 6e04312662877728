//! Tests for NoopProcessor

use serde_json::json;
use transfer_pipeline::{DataProcessor, Payload, PayloadFlag, kill_channel, payload_channel};

use super::*;

#[tokio::test]
async fn test_noop_passes_through() {
    let processor = NoopProcessor::new();
    let (output, rx) = payload_channel(4);
    let (kill, _kill_rx) = kill_channel(1);

    let payload = Payload::from_value(&json!({"a": 1}), PayloadFlag::NONE).unwrap();
    let sn = payload.sn();
    processor.process(Some(payload), &output, &kill).await;

    let forwarded = rx.recv().await.unwrap();
    assert_eq!(forwarded.sn(), sn);
    assert_eq!(&forwarded.body()[..], b"{\"a\":1}");
    assert_eq!(processor.metrics().snapshot().successes, 1);
}

#[tokio::test]
async fn test_noop_closed_output() {
    let processor = NoopProcessor::new();
    let (output, rx) = payload_channel(1);
    let (kill, _kill_rx) = kill_channel(1);
    drop(rx);

    processor
        .process(Some(Payload::from_bytes("{}", PayloadFlag::NONE)), &output, &kill)
        .await;
    assert_eq!(processor.metrics().snapshot().fails, 1);
}

#[test]
fn test_noop_display() {
    let mut processor = NoopProcessor::new();
    assert_eq!(processor.to_string(), "noop:0");
    processor.set_index(2);
    assert_eq!(processor.to_string(), "noop:2");
}
