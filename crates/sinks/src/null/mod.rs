//! Null backend - discards all data
//!
//! Receives payloads, updates counters and drops them.
//!
//! # Use Cases
//!
//! - **Benchmarking**: Measure pure pipeline throughput without sink bottlenecks
//! - **Testing**: Validate branching and frontend configuration
//! - **Development**: Quick iteration without setting up external services

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use transfer_pipeline::{Backend, BuildScope, KillSender, Result};
use transfer_protocol::Payload;

use crate::common::table_name;

/// Counters of the null backend
#[derive(Debug, Default)]
pub struct NullBackendMetrics {
    /// Total payloads received
    payloads_received: AtomicU64,

    /// Total bytes received
    bytes_received: AtomicU64,
}

impl NullBackendMetrics {
    #[inline]
    pub const fn new() -> Self {
        Self {
            payloads_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record(&self, bytes: u64) {
        self.payloads_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn payloads_received(&self) -> u64 {
        self.payloads_received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

/// Backend that discards every payload
pub struct NullBackend {
    name: String,
    metrics: Arc<NullBackendMetrics>,
    closed: AtomicBool,
}

impl NullBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: Arc::new(NullBackendMetrics::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Backend named after the scope's result table
    pub fn from_scope(scope: &BuildScope) -> Self {
        match table_name(scope) {
            "" => Self::new("null"),
            table => Self::new(format!("null:{table}")),
        }
    }

    /// Shared handle to the counters
    pub fn metrics(&self) -> Arc<NullBackendMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Backend for NullBackend {
    async fn push(&self, payload: Payload, _kill: &KillSender) {
        self.metrics.record(payload.len() as u64);
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(
                backend = %self.name,
                payloads = self.metrics.payloads_received(),
                bytes = self.metrics.bytes_received(),
                "null backend closed"
            );
        }
        Ok(())
    }
}

impl fmt::Display for NullBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
#[path = "null_test.rs"]
mod null_test;
