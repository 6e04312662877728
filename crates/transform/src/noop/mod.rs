//! Noop processor - pass-through stage for testing
//!
//! The `NoopProcessor` forwards payloads unchanged. It's useful for:
//! - Testing branch wiring without touching records
//! - Benchmarking processor overhead
//! - Placeholder in development

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use transfer_pipeline::{DataProcessor, KillSender, Payload, PayloadSender, ProcessorMetrics};

#[cfg(test)]
mod noop_test;

/// A processor that forwards payloads unchanged
#[derive(Debug, Default)]
pub struct NoopProcessor {
    index: usize,
    metrics: Arc<ProcessorMetrics>,
}

impl NoopProcessor {
    /// Create a new noop processor
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &Arc<ProcessorMetrics> {
        &self.metrics
    }
}

#[async_trait]
impl DataProcessor for NoopProcessor {
    async fn process(&self, payload: Option<Payload>, output: &PayloadSender, _kill: &KillSender) {
        let Some(payload) = payload else {
            return;
        };
        self.metrics.record_handled();
        let sn = payload.sn();
        if output.send(payload).await.is_ok() {
            self.metrics.record_success();
        } else {
            self.metrics.record_fails(1);
            tracing::debug!(index = self.index, sn, "noop output closed, payload dropped");
        }
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

impl fmt::Display for NoopProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "noop:{}", self.index)
    }
}
