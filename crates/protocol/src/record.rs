//! ETL record - the typed shape most processors and backends agree on

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dimension key holding the metric name of a single-metric record
pub const METRIC_KEY_FIELD: &str = "metric_name";

/// Metric key holding the value of a single-metric record
pub const METRIC_VALUE_FIELD: &str = "value";

/// Record with dimensions and metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtlRecord {
    /// Unix timestamp of the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,

    #[serde(default)]
    pub dimensions: Map<String, Value>,

    #[serde(default)]
    pub metrics: Map<String, Value>,

    /// Trace exemplar attached to the metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemplar: Option<Map<String, Value>>,
}

impl EtlRecord {
    pub fn new(time: Option<i64>) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    /// Split into one record per metric
    ///
    /// Each split record keeps the dimensions, gains a `metric_name`
    /// dimension and carries its value under `value`. `convert` maps each
    /// value; returning `None` skips that metric.
    pub fn split_metrics<F>(&self, mut convert: F) -> Vec<EtlRecord>
    where
        F: FnMut(&Value) -> Option<Value>,
    {
        let mut records = Vec::with_capacity(self.metrics.len());
        for (key, value) in &self.metrics {
            let Some(value) = convert(value) else {
                continue;
            };

            let mut dimensions = self.dimensions.clone();
            dimensions.insert(METRIC_KEY_FIELD.to_string(), Value::String(key.clone()));

            let mut metrics = Map::with_capacity(1);
            metrics.insert(METRIC_VALUE_FIELD.to_string(), value);

            records.push(EtlRecord {
                time: self.time,
                dimensions,
                metrics,
                exemplar: self.exemplar.clone(),
            });
        }
        records
    }
}
