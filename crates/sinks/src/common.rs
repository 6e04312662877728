//! Common types and utilities for backends
//!
//! Shared functionality across all backend types.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use transfer_config::RecordFields;
use transfer_pipeline::{BuildScope, PipelineError};
use transfer_protocol::Payload;

/// Common errors for backends
#[derive(Debug, Error)]
pub enum SinkError {
    /// I/O error during write
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be turned into a line
    #[error("format error: {0}")]
    Format(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Backend is closed
    #[error("backend closed")]
    Closed,
}

impl SinkError {
    /// Flush failure reported to the bulk adapter
    pub fn into_flush(self) -> PipelineError {
        PipelineError::Flush(self.to_string())
    }
}

/// Counters shared by all backend types
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Total records written
    pub records_written: AtomicU64,

    /// Total bytes written
    pub bytes_written: AtomicU64,

    /// Write errors encountered
    pub write_errors: AtomicU64,

    /// Batches written
    pub flush_count: AtomicU64,
}

impl SinkMetrics {
    pub const fn new() -> Self {
        Self {
            records_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        }
    }

    /// Record a written batch
    #[inline]
    pub fn batch_written(&self, records: u64, bytes: u64) {
        self.records_written.fetch_add(records, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_written: self.records_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_written: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub flush_count: u64,
}

/// Name of the result table being built, empty outside a table
pub(crate) fn table_name(scope: &BuildScope) -> &str {
    scope
        .result_table()
        .map(|t| t.result_table.as_str())
        .unwrap_or_default()
}

/// Field restriction applied to every record before it is written
///
/// Empty until the builder hands the backend its field set; an empty set
/// keeps records whole.
#[derive(Debug, Default)]
pub struct Projection {
    fields: RwLock<Option<RecordFields>>,
}

impl Projection {
    pub fn set(&self, fields: RecordFields) {
        *self.fields.write() = Some(fields);
    }

    pub fn get(&self) -> Option<RecordFields> {
        self.fields.read().clone()
    }

    /// Serialize one payload as a JSON line, without trailing newline
    pub fn line(&self, payload: &Payload) -> Result<String, SinkError> {
        let value: Value = payload
            .to()
            .map_err(|e| SinkError::Format(e.to_string()))?;
        let value = match self.fields.read().as_ref() {
            Some(fields) => project(value, fields),
            None => value,
        };
        serde_json::to_string(&value).map_err(|e| SinkError::Format(e.to_string()))
    }
}

/// Keep only the fields named in `fields`
///
/// Records shaped like `{time, dimensions, metrics}` are filtered per
/// section; other objects keep the union of all named fields. A section
/// with no names is left untouched.
pub fn project(value: Value, fields: &RecordFields) -> Value {
    let Value::Object(mut object) = value else {
        return value;
    };

    let nested = object.get("dimensions").is_some_and(Value::is_object)
        || object.get("metrics").is_some_and(Value::is_object);
    if nested {
        retain_section(&mut object, "dimensions", &fields.dimensions);
        retain_section(&mut object, "metrics", &fields.metrics);
        if let Some(time_field) = &fields.time_field
            && time_field != "time"
            && let Some(time) = object.remove("time")
        {
            object.insert(time_field.clone(), time);
        }
        return Value::Object(object);
    }

    let names: Vec<&String> = fields
        .time_field
        .iter()
        .chain(&fields.dimensions)
        .chain(&fields.metrics)
        .collect();
    if !names.is_empty() {
        object.retain(|key, _| names.iter().any(|name| *name == key));
    }
    Value::Object(object)
}

fn retain_section(object: &mut Map<String, Value>, section: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    if let Some(Value::Object(map)) = object.get_mut(section) {
        map.retain(|key, _| names.iter().any(|name| name == key));
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
