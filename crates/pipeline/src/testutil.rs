//! Mock components shared by the unit tests

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use transfer_protocol::{Payload, PayloadFlag};

use crate::channel::{KillSender, PayloadReceiver, PayloadSender};
use crate::error::Result;
use crate::traits::{Backend, DataProcessor, Frontend};

pub fn json_payload(value: Value) -> Payload {
    Payload::from_value(&value, PayloadFlag::NONE).unwrap()
}

/// Receive up to `count` payloads, giving up after `timeout`
pub async fn collect(rx: &PayloadReceiver, count: usize, timeout: Duration) -> Vec<Payload> {
    let mut out = Vec::with_capacity(count);
    let _ = tokio::time::timeout(timeout, async {
        while out.len() < count {
            match rx.recv().await {
                Ok(payload) => out.push(payload),
                Err(_) => break,
            }
        }
    })
    .await;
    out
}

/// Value of `key` in a JSON payload
pub fn field(payload: &Payload, key: &str) -> Value {
    let value: Value = payload.to().unwrap();
    value.get(key).cloned().unwrap_or(Value::Null)
}

// ============================================================================
// Frontend
// ============================================================================

/// Emits a fixed list of payloads, optionally holding the pull open
pub struct VecFrontend {
    payloads: Mutex<Vec<Payload>>,
    hold: bool,
    pub closed: Arc<AtomicUsize>,
}

impl VecFrontend {
    pub fn new(payloads: Vec<Payload>) -> Self {
        Self {
            payloads: Mutex::new(payloads),
            hold: false,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Keep pulling (idle) after the payloads are sent
    pub fn holding(mut self) -> Self {
        self.hold = true;
        self
    }
}

#[async_trait]
impl Frontend for VecFrontend {
    async fn pull(&self, output: &PayloadSender, _kill: &KillSender) {
        let payloads = std::mem::take(&mut *self.payloads.lock());
        for payload in payloads {
            if output.send(payload).await.is_err() {
                return;
            }
        }
        if self.hold {
            std::future::pending::<()>().await;
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl fmt::Display for VecFrontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("vec")
    }
}

// ============================================================================
// Backend
// ============================================================================

/// What a [`RecordingBackend`] saw
#[derive(Default)]
pub struct Recorder {
    pub pushed: Mutex<Vec<Payload>>,
    pub closed: AtomicUsize,
    pub pushed_after_close: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn values(&self, key: &str) -> Vec<Value> {
        self.pushed.lock().iter().map(|p| field(p, key)).collect()
    }

    pub fn count(&self) -> usize {
        self.pushed.lock().len()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct RecordingBackend {
    name: String,
    recorder: Arc<Recorder>,
    delay: Duration,
}

impl RecordingBackend {
    pub fn new(name: &str, recorder: Arc<Recorder>) -> Self {
        Self {
            name: name.to_string(),
            recorder,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn push(&self, payload: Payload, _kill: &KillSender) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.recorder.closed() > 0 {
            self.recorder.pushed_after_close.fetch_add(1, Ordering::SeqCst);
        }
        self.recorder.pushed.lock().push(payload);
    }

    async fn close(&self) -> Result<()> {
        self.recorder.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl fmt::Display for RecordingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// Processors
// ============================================================================

/// Forwards payloads whose `key` field equals `value`, or all of them
pub struct FilterProcessor {
    filter: Option<(String, Value)>,
    pub index: usize,
}

impl FilterProcessor {
    pub fn pass() -> Self {
        Self {
            filter: None,
            index: 0,
        }
    }

    pub fn matching(key: &str, value: impl Into<Value>) -> Self {
        Self {
            filter: Some((key.to_string(), value.into())),
            index: 0,
        }
    }
}

#[async_trait]
impl DataProcessor for FilterProcessor {
    async fn process(&self, payload: Option<Payload>, output: &PayloadSender, _kill: &KillSender) {
        let Some(payload) = payload else {
            return;
        };
        if let Some((key, value)) = &self.filter
            && field(&payload, key) != *value
        {
            return;
        }
        let _ = output.send(payload).await;
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

impl fmt::Display for FilterProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some((key, value)) => write!(f, "filter({key}={value})"),
            None => f.write_str("pass"),
        }
    }
}

/// Panics on the first payload
pub struct PanicProcessor;

#[async_trait]
impl DataProcessor for PanicProcessor {
    async fn process(&self, payload: Option<Payload>, _output: &PayloadSender, _kill: &KillSender) {
        if payload.is_some() {
            panic!("boom");
        }
    }
}

impl fmt::Display for PanicProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("panic")
    }
}

/// Counts poll ticks and finish calls
pub struct TickProcessor {
    poll: Duration,
    pub ticks: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
}

impl TickProcessor {
    pub fn new(poll: Duration) -> Self {
        Self {
            poll,
            ticks: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl DataProcessor for TickProcessor {
    async fn process(&self, payload: Option<Payload>, output: &PayloadSender, _kill: &KillSender) {
        match payload {
            Some(payload) => {
                let _ = output.send(payload).await;
            }
            None => {
                self.ticks.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    async fn finish(&self, _output: &PayloadSender, _kill: &KillSender) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn poll(&self) -> Duration {
        self.poll
    }
}

impl fmt::Display for TickProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tick")
    }
}
