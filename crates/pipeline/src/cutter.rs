//! Metric cutter - splits multi-metric records before a backend
//!
//! A record carrying N metrics is pushed as N records with one metric
//! each: the metric name goes to the `metric_name` dimension and its value
//! to the `value` metric. Every split payload is derived from the
//! original, keeping its flag and time.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Number, Value};
use transfer_config::{RecordFields, keys};
use transfer_protocol::{EtlRecord, Payload, derive_payload};

use crate::channel::KillSender;
use crate::error::Result;
use crate::metrics::ProcessorMetrics;
use crate::scope::BuildScope;
use crate::traits::Backend;

/// [`Backend`] wrapper cutting records by metric
pub struct CutterBackend {
    inner: Box<dyn Backend>,
    as_float: bool,
    metrics: Arc<ProcessorMetrics>,
}

impl CutterBackend {
    pub fn new(inner: Box<dyn Backend>, as_float: bool) -> Self {
        Self {
            inner,
            as_float,
            metrics: Arc::new(ProcessorMetrics::new()),
        }
    }

    /// Wrap `inner` unless the pipeline disables the cutter
    ///
    /// `dynamic_metrics_as_float` defaults to true.
    pub fn wrap(scope: &BuildScope, inner: Box<dyn Backend>) -> Result<Box<dyn Backend>> {
        let option = &scope.pipeline().option;
        if option.bool_or(keys::DISABLE_METRIC_CUTTER, false)? {
            return Ok(inner);
        }
        let as_float = option.bool_or(keys::DYNAMIC_METRICS_AS_FLOAT, true)?;
        Ok(Box::new(Self::new(inner, as_float)))
    }

    pub fn metrics(&self) -> &Arc<ProcessorMetrics> {
        &self.metrics
    }

    fn convert(&self, value: &Value) -> Option<Value> {
        if self.as_float {
            to_float(value)
        } else {
            Some(value.clone())
        }
    }
}

/// Float form of a metric value; null stays null, non-numeric is `None`
fn to_float(value: &Value) -> Option<Value> {
    let float = match value {
        Value::Null => return Some(Value::Null),
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    Number::from_f64(float).map(Value::Number)
}

#[async_trait]
impl Backend for CutterBackend {
    async fn push(&self, payload: Payload, kill: &KillSender) {
        self.metrics.record_handled();
        let record: EtlRecord = match payload.to() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(backend = %self, sn = payload.sn(), error = %e, "payload to record failed");
                self.metrics.record_fails(1);
                return;
            }
        };

        let total = record.metrics.len();
        let records = record.split_metrics(|value| self.convert(value));
        if records.len() < total {
            tracing::warn!(
                backend = %self,
                sn = payload.sn(),
                skipped = total - records.len(),
                "metrics not convertible to float skipped"
            );
        }

        for split in records {
            match derive_payload(&payload, &split) {
                Ok(derived) => {
                    self.metrics.record_success();
                    self.inner.push(derived, kill).await;
                }
                Err(e) => {
                    tracing::warn!(backend = %self, sn = payload.sn(), error = %e, "derive payload failed");
                    self.metrics.record_fails(1);
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn set_record_fields(&self, fields: RecordFields) {
        self.inner.set_record_fields(fields);
    }
}

impl fmt::Display for CutterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cutter:{}", self.inner)
    }
}
