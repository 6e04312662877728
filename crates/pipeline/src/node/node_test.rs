use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use transfer_config::RuntimeConfig;

use super::*;
use crate::channel::{kill_channel, payload_channel};
use crate::error::PipelineError;
use crate::scope::BuildScope;
use crate::testutil::{
    FilterProcessor, PanicProcessor, Recorder, RecordingBackend, TickProcessor, VecFrontend,
    collect, field, json_payload,
};
use crate::traits::Frontend;

const TIMEOUT: Duration = Duration::from_secs(2);

fn payloads(n: usize) -> Vec<transfer_protocol::Payload> {
    (0..n).map(|i| json_payload(json!({ "i": i }))).collect()
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

// ============================================================================
// Base bookkeeping
// ============================================================================

#[test]
fn test_connect_from_twice() {
    let scope = BuildScope::detached();
    let node = ProcessNode::new(&scope, Box::new(FilterProcessor::pass()));
    let (_tx, rx) = payload_channel(1);

    node.connect_from(rx.clone()).unwrap();
    let err = node.connect_from(rx).unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyConnected(name) if name == "0:pass"));
}

#[test]
fn test_stop_without_start() {
    let scope = BuildScope::detached();
    let node = ProcessNode::new(&scope, Box::new(FilterProcessor::pass()));
    assert!(matches!(node.stop(), Err(PipelineError::NotStarted(_))));
}

#[test]
fn test_rejected_stop_keeps_node_alive() {
    let base = BaseNode::new("idle", tokio_util::sync::CancellationToken::new());
    assert!(matches!(base.stop(), Err(PipelineError::NotStarted(_))));
    assert!(!base.token().is_cancelled());

    let (kill, _kill_rx) = kill_channel(1);
    base.start(kill);
    base.stop().unwrap();
    assert!(base.token().is_cancelled());
}

#[tokio::test]
async fn test_stop_more_than_start() {
    let scope = BuildScope::detached();
    let node = GluttonousNode::new(&scope);
    let (kill, _kill_rx) = kill_channel(1);

    node.start(kill);
    node.stop().unwrap();
    assert!(matches!(node.stop(), Err(PipelineError::NotStarted(_))));
    node.wait().await.unwrap();
}

#[tokio::test]
async fn test_wait_without_start() {
    let scope = BuildScope::detached();
    let node = ProcessNode::new(&scope, Box::new(FilterProcessor::pass()));
    tokio::time::timeout(TIMEOUT, node.wait())
        .await
        .expect("wait without start should return")
        .unwrap();
}

#[test]
fn test_process_node_named_by_lane() {
    let scope = BuildScope::detached().for_runtime(RuntimeConfig { pipeline_count: 2 });
    let node = ProcessNode::new(&scope, Box::new(FilterProcessor::pass()));
    assert_eq!(node.to_string(), "2:pass");
}

// ============================================================================
// Frontend
// ============================================================================

#[tokio::test]
async fn test_frontend_emits_then_closes_output() {
    let scope = BuildScope::detached();
    let frontend = VecFrontend::new(payloads(3));
    let closed = Arc::clone(&frontend.closed);
    let node = FrontendNode::new(&scope, Box::new(frontend), Duration::from_secs(60));
    let (kill, _kill_rx) = kill_channel(1);

    let output = node.output().unwrap();
    node.start(kill);

    let received = collect(&output, 10, TIMEOUT).await;
    let order: Vec<_> = received.iter().map(|p| field(p, "i")).collect();
    assert_eq!(order, vec![json!(0), json!(1), json!(2)]);
    // the pull finished, so the output closed on its own
    assert!(output.recv().await.is_err());
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    node.stop().unwrap();
    node.wait().await.unwrap();
}

#[tokio::test]
async fn test_frontend_timeout_raises_kill() {
    let scope = BuildScope::detached();
    let node = FrontendNode::new(
        &scope,
        Box::new(VecFrontend::new(Vec::new())),
        Duration::from_millis(20),
    );
    let (kill, mut kill_rx) = kill_channel(1);

    node.start(kill);
    let err = tokio::time::timeout(TIMEOUT, kill_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, PipelineError::FrontendTimeout(name) if name == "+:vec"));

    node.stop().unwrap();
    node.wait().await.unwrap();
}

#[tokio::test]
async fn test_frontend_stopped_before_timeout() {
    let scope = BuildScope::detached();
    let node = FrontendNode::new(
        &scope,
        Box::new(VecFrontend::new(Vec::new()).holding()),
        Duration::from_millis(10),
    );
    let (kill, mut kill_rx) = kill_channel(1);

    node.start(kill);
    assert!(node.is_running());
    node.stop().unwrap();
    node.wait().await.unwrap();

    assert!(!node.is_running());
    assert!(kill_rx.try_recv().is_err());
}

#[test]
fn test_frontend_rejects_input() {
    let scope = BuildScope::detached();
    let node = FrontendNode::new(&scope, Box::new(VecFrontend::new(Vec::new())), Duration::ZERO);
    let (_tx, rx) = payload_channel(1);
    assert!(matches!(node.connect_from(rx), Err(PipelineError::Build(_))));
}

#[tokio::test]
async fn test_frontend_offset_hooks_default_to_noop() {
    let frontend = VecFrontend::new(payloads(1));
    frontend.commit().await.unwrap();
    frontend.reset().await.unwrap();
}

// ============================================================================
// Processor
// ============================================================================

#[tokio::test]
async fn test_processor_panic_raises_kill() {
    let scope = BuildScope::detached();
    let node = ProcessNode::new(&scope, Box::new(PanicProcessor));
    let (tx, rx) = payload_channel(1);
    node.connect_from(rx).unwrap();
    let (kill, mut kill_rx) = kill_channel(1);

    node.start(kill);
    tx.send(json_payload(json!({"i": 0}))).await.unwrap();

    let err = tokio::time::timeout(TIMEOUT, kill_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match err {
        PipelineError::Panic { node, message } => {
            assert_eq!(node, "0:panic");
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }

    node.stop().unwrap();
    node.wait().await.unwrap();
}

#[tokio::test]
async fn test_processor_poll_ticks_and_finish() {
    let scope = BuildScope::detached();
    let processor = TickProcessor::new(Duration::from_millis(10));
    let ticks = Arc::clone(&processor.ticks);
    let finished = Arc::clone(&processor.finished);
    let node = ProcessNode::new(&scope, Box::new(processor));
    let (kill, _kill_rx) = kill_channel(1);

    node.start(kill);
    assert!(wait_until(|| ticks.load(Ordering::SeqCst) >= 2).await);

    node.stop().unwrap();
    node.wait().await.unwrap();
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_processor_finishes_when_input_closes() {
    let scope = BuildScope::detached();
    let processor = TickProcessor::new(Duration::ZERO);
    let finished = Arc::clone(&processor.finished);
    let node = ProcessNode::new(&scope, Box::new(processor));
    let (tx, rx) = payload_channel(4);
    node.connect_from(rx).unwrap();
    let output = node.output().unwrap();
    let (kill, _kill_rx) = kill_channel(1);

    node.start(kill);
    for payload in payloads(2) {
        tx.send(payload).await.unwrap();
    }
    drop(tx);

    assert_eq!(collect(&output, 2, TIMEOUT).await.len(), 2);
    // input closed: processor finished and the output followed
    assert!(output.recv().await.is_err());
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(wait_until(|| !node.is_running()).await);

    node.stop().unwrap();
    node.wait().await.unwrap();
}

#[tokio::test]
async fn test_wait_discards_unread_output() {
    let scope = BuildScope::detached();
    let node = ProcessNode::new(&scope, Box::new(FilterProcessor::pass()));
    let (tx, rx) = payload_channel(4);
    node.connect_from(rx).unwrap();
    let (kill, _kill_rx) = kill_channel(1);

    for payload in payloads(3) {
        tx.send(payload).await.unwrap();
    }
    node.start(kill);
    node.stop().unwrap();

    // nobody reads the output; wait must not hang on the blocked sender
    tokio::time::timeout(TIMEOUT, node.wait())
        .await
        .expect("wait should drain the output")
        .unwrap();
    drop(tx);
}

// ============================================================================
// Backend
// ============================================================================

#[tokio::test]
async fn test_backend_closed_after_workers() {
    let scope = BuildScope::detached();
    let recorder = Recorder::new();
    let node = BackendNode::new(
        &scope,
        Box::new(RecordingBackend::new("rec", Arc::clone(&recorder)).with_delay(Duration::from_millis(2))),
    )
    .with_workers(3);
    assert_eq!(node.to_string(), "$:rec");
    assert_eq!(node.workers(), 3);

    let (tx, rx) = payload_channel(8);
    node.connect_from(rx).unwrap();
    let (kill, _kill_rx) = kill_channel(1);

    node.start(kill);
    for payload in payloads(6) {
        tx.send(payload).await.unwrap();
    }
    drop(tx);

    assert!(wait_until(|| recorder.closed() == 1).await);
    assert_eq!(recorder.count(), 6);
    assert_eq!(recorder.pushed_after_close.load(Ordering::SeqCst), 0);
    assert!(wait_until(|| !node.is_running()).await);

    node.stop().unwrap();
    node.wait().await.unwrap();
    assert_eq!(recorder.closed(), 1);
}

#[tokio::test]
async fn test_backend_forwards_to_successor() {
    let scope = BuildScope::detached();
    let recorder = Recorder::new();
    let backend: NodeRef = Arc::new(BackendNode::new(
        &scope,
        Box::new(RecordingBackend::new("rec", Arc::clone(&recorder))),
    ));
    let sink = Arc::new(GluttonousNode::new(&scope));
    let sink_ref: NodeRef = Arc::clone(&sink) as NodeRef;

    let (tx, rx) = payload_channel(4);
    backend.connect_from(rx).unwrap();
    backend.connect_to(&sink_ref).unwrap();
    let (kill, _kill_rx) = kill_channel(1);

    sink_ref.start(kill.clone());
    backend.start(kill);
    for payload in payloads(3) {
        tx.send(payload).await.unwrap();
    }
    drop(tx);

    assert!(wait_until(|| sink.consumed() == 3).await);
    assert_eq!(recorder.count(), 3);

    for node in [&backend, &sink_ref] {
        node.stop().unwrap();
        node.wait().await.unwrap();
    }
}

// ============================================================================
// Gluttonous
// ============================================================================

#[tokio::test]
async fn test_gluttonous_swallows_everything() {
    let scope = BuildScope::detached();
    let node = GluttonousNode::new(&scope);
    let (tx, rx) = payload_channel(1);
    node.connect_from(rx).unwrap();
    let (kill, _kill_rx) = kill_channel(1);

    node.start(kill);
    for payload in payloads(5) {
        tx.send(payload).await.unwrap();
    }
    drop(tx);

    assert!(wait_until(|| node.consumed() == 5).await);
    assert!(node.output().is_none());

    let other: NodeRef = Arc::new(GluttonousNode::new(&scope));
    assert!(node.connect_to(&other).is_err());

    node.stop().unwrap();
    node.wait().await.unwrap();
}

#[test]
fn test_same_node() {
    let scope = BuildScope::detached();
    let a: NodeRef = Arc::new(GluttonousNode::new(&scope));
    let b: NodeRef = Arc::new(GluttonousNode::new(&scope));
    assert!(same_node(&a, &Arc::clone(&a)));
    assert!(!same_node(&a, &b));
}
