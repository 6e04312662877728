//! Flat batch processor - one record per batch item
//!
//! Expands batched reports into individual records:
//!
//! - a JSON array body yields one payload per element
//! - an object whose `flat_batch_key` field (default `items`) is an array
//!   yields one payload per item, each item merged over the parent's other
//!   fields
//! - any other object passes through unchanged
//!
//! ```text
//! {"ip":"a","items":[{"v":1},{"v":2}]}  →  {"ip":"a","v":1}
//!                                          {"ip":"a","v":2}
//! ```
//!
//! Every output payload is derived from its input, keeping flag and time.
//! Bodies that are not JSON are dropped; in strict mode they also raise a
//! kill.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use transfer_config::keys;
use transfer_pipeline::{
    BuildScope, DataProcessor, KillSender, Payload, PayloadSender, PipelineError,
    ProcessorMetrics, Result, derive_payload,
};

/// Default array field holding batch items
pub const DEFAULT_BATCH_KEY: &str = "items";

/// Processor flattening batched payloads
#[derive(Debug)]
pub struct FlatBatchProcessor {
    key: String,
    strict: bool,
    index: usize,
    metrics: Arc<ProcessorMetrics>,
}

impl FlatBatchProcessor {
    pub fn new(key: impl Into<String>, strict: bool) -> Self {
        Self {
            key: key.into(),
            strict,
            index: 0,
            metrics: Arc::new(ProcessorMetrics::new()),
        }
    }

    /// Processor configured from the pipeline options
    ///
    /// Counters are published on the scope's metrics board, if any.
    pub fn from_scope(scope: &BuildScope) -> Result<Self> {
        let key = scope
            .pipeline()
            .option
            .str_or(keys::FLAT_BATCH_KEY, DEFAULT_BATCH_KEY)?;
        let processor = Self::new(key, scope.global().strict_mode);
        if let Some(board) = scope.metrics_board() {
            board.register(
                format!("flat_batch:{}", scope.pipeline().name()),
                Arc::clone(&processor.metrics),
            );
        }
        Ok(processor)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn metrics(&self) -> &Arc<ProcessorMetrics> {
        &self.metrics
    }

    /// Records carried by one decoded body
    pub fn flatten(&self, value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            Value::Object(mut object) => match object.remove(&self.key) {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .map(|item| merge(&object, item, &self.key))
                    .collect(),
                Some(other) => {
                    object.insert(self.key.clone(), other);
                    vec![Value::Object(object)]
                }
                None => vec![Value::Object(object)],
            },
            other => vec![other],
        }
    }

    async fn reject(&self, payload: &Payload, err: PipelineError, kill: &KillSender) {
        self.metrics.record_fails(1);
        tracing::warn!(processor = %self, sn = payload.sn(), error = %err, "payload dropped");
        if self.strict && kill.send(err).await.is_err() {
            tracing::debug!(processor = %self, "kill channel closed");
        }
    }
}

/// Parent fields with the item's fields on top
fn merge(parent: &Map<String, Value>, item: Value, key: &str) -> Value {
    let mut record = parent.clone();
    match item {
        Value::Object(fields) => record.extend(fields),
        other => {
            record.insert(key.to_string(), other);
        }
    }
    Value::Object(record)
}

#[async_trait]
impl DataProcessor for FlatBatchProcessor {
    async fn process(&self, payload: Option<Payload>, output: &PayloadSender, kill: &KillSender) {
        let Some(payload) = payload else {
            return;
        };
        self.metrics.record_handled();

        let value: Value = match payload.to() {
            Ok(value) => value,
            Err(e) => return self.reject(&payload, e.into(), kill).await,
        };

        for record in self.flatten(value) {
            let derived = match derive_payload(&payload, &record) {
                Ok(derived) => derived,
                Err(e) => {
                    self.reject(&payload, e.into(), kill).await;
                    continue;
                }
            };
            if output.send(derived).await.is_err() {
                tracing::debug!(processor = %self, sn = payload.sn(), "output closed");
                self.metrics.record_fails(1);
                return;
            }
            self.metrics.record_success();
        }
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

impl fmt::Display for FlatBatchProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flat_batch:{}", self.index)
    }
}
