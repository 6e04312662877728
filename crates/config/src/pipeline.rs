//! Pipeline, result table and shipper configuration
//!
//! One `PipelineConfig` describes a whole pipeline: the queue it reads from
//! (`mq_config`), the processors it runs and the result tables it writes.
//! Each result table lists the shippers (backend destinations) receiving
//! its records.
//!
//! # Example
//!
//! ```toml
//! [[pipelines]]
//! data_id = 1001
//! etl_config = "flat_batch"
//! processors = ["flat_batch"]
//!
//! [pipelines.mq_config]
//! cluster_type = "file"
//! cluster_config = { path = "input.jsonl" }
//!
//! [[pipelines.result_table_list]]
//! result_table = "system.cpu"
//! multi_num = 2
//!
//! [[pipelines.result_table_list.shipper_list]]
//! cluster_type = "stdout"
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::global::BulkConfig;
use crate::options::{Options, keys};

/// One pipeline
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Data id, unique per process
    pub data_id: i64,

    /// Free-form label of the data type
    pub type_label: String,

    /// ETL template name
    pub etl_config: String,

    /// Processor names spliced between the frontend and each backend
    pub processors: Vec<String>,

    /// Pipeline options
    pub option: Options,

    /// Source the frontend reads from
    pub mq_config: ShipperConfig,

    /// Result tables written by this pipeline
    pub result_table_list: Vec<ResultTableConfig>,
}

impl PipelineConfig {
    pub fn new(data_id: i64) -> Self {
        Self {
            data_id,
            ..Self::default()
        }
    }

    /// Display name used in logs and node names
    pub fn name(&self) -> String {
        if self.etl_config.is_empty() {
            format!("pipeline:{}", self.data_id)
        } else {
            format!("{}:{}", self.etl_config, self.data_id)
        }
    }

    pub fn with_result_table(mut self, table: ResultTableConfig) -> Self {
        self.result_table_list.push(table);
        self
    }

    pub fn with_mq_config(mut self, mq: ShipperConfig) -> Self {
        self.mq_config = mq;
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.option.insert(key, value);
        self
    }

    pub fn is_log_cluster(&self) -> Result<bool> {
        self.option.bool_or(keys::IS_LOG_CLUSTER, false)
    }

    /// Normalize in place: trimmed names, multiplicity of at least one
    pub fn clean(&mut self) {
        self.etl_config = self.etl_config.trim().to_string();
        self.mq_config.cluster_type = self.mq_config.cluster_type.trim().to_string();
        for table in &mut self.result_table_list {
            table.clean();
        }
    }

    /// Check the fields a build depends on
    pub fn validate(&self) -> Result<()> {
        let name = self.name();
        if self.mq_config.cluster_type.is_empty() {
            return Err(ConfigError::missing_field(
                "pipeline",
                name,
                "mq_config.cluster_type",
            ));
        }
        for table in &self.result_table_list {
            for shipper in &table.shipper_list {
                if shipper.cluster_type.is_empty() {
                    return Err(ConfigError::missing_field(
                        "result table",
                        table.result_table.clone(),
                        "shipper_list.cluster_type",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One logical output stream of a pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResultTableConfig {
    /// Table name, empty tables are skipped at build time
    pub result_table: String,

    pub schema_type: String,

    pub option: Options,

    /// Backend destinations
    pub shipper_list: Vec<ShipperConfig>,

    pub field_list: Vec<FieldConfig>,

    /// Parallel lanes and backend workers
    /// Default: 1
    pub multi_num: usize,
}

impl Default for ResultTableConfig {
    fn default() -> Self {
        Self {
            result_table: String::new(),
            schema_type: String::new(),
            option: Options::new(),
            shipper_list: Vec::new(),
            field_list: Vec::new(),
            multi_num: 1,
        }
    }
}

impl ResultTableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            result_table: name.into(),
            ..Self::default()
        }
    }

    pub fn with_shipper(mut self, shipper: ShipperConfig) -> Self {
        self.shipper_list.push(shipper);
        self
    }

    pub fn with_multi_num(mut self, multi_num: usize) -> Self {
        self.multi_num = multi_num;
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.option.insert(key, value);
        self
    }

    fn clean(&mut self) {
        self.result_table = self.result_table.trim().to_string();
        self.multi_num = self.multi_num.max(1);
        for shipper in &mut self.shipper_list {
            shipper.cluster_type = shipper.cluster_type.trim().to_string();
        }
    }

    /// Lane count, the `multi_num` option wins over the field
    pub fn effective_multi_num(&self) -> Result<usize> {
        Ok(match self.option.get_u64(keys::MULTI_NUM)? {
            Some(n) if n > 0 => n as usize,
            _ => self.multi_num.max(1),
        })
    }

    /// Field set derived from the declared field list
    pub fn record_fields(&self) -> RecordFields {
        RecordFields::from_field_list(&self.field_list)
    }
}

/// One backend destination or the frontend source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Registered component name (e.g. "file", "stdout")
    pub cluster_type: String,

    /// Connection settings
    pub cluster_config: Options,

    /// Storage settings (paths, index names)
    pub storage_config: Options,

    pub auth_info: Options,

    /// Bulk buffer size override, 0 keeps the global default
    pub batch_size: usize,

    /// Bulk concurrency override, 0 keeps the global default
    pub bulk_concurrency: usize,

    /// Bulk flush interval override
    #[serde(with = "humantime_serde")]
    pub flush_interval: Option<Duration>,
}

impl ShipperConfig {
    pub fn new(cluster_type: impl Into<String>) -> Self {
        Self {
            cluster_type: cluster_type.into(),
            ..Self::default()
        }
    }

    pub fn with_cluster_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.cluster_config.insert(key, value);
        self
    }

    pub fn with_storage_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.storage_config.insert(key, value);
        self
    }

    /// Bulk settings of this shipper on top of `defaults`
    pub fn bulk_config(&self, defaults: &BulkConfig) -> BulkConfig {
        let mut bulk = defaults.clone();
        if self.batch_size > 0 {
            bulk.buffer_size = self.batch_size;
        }
        if self.bulk_concurrency > 0 {
            bulk.concurrency = self.bulk_concurrency.min(bulk.max_concurrency);
        }
        if let Some(interval) = self.flush_interval.filter(|d| !d.is_zero()) {
            bulk.flush_interval = interval;
        }
        bulk
    }
}

/// Field declaration of a result table
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldConfig {
    pub field_name: String,

    #[serde(rename = "type")]
    pub field_type: String,

    /// "dimension", "metric" or "timestamp"
    pub tag: String,

    pub alias_name: String,

    pub is_config_by_user: bool,

    pub option: Options,
}

/// Fields a backend keeps from each record
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordFields {
    pub time_field: Option<String>,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
}

impl RecordFields {
    pub fn from_field_list(fields: &[FieldConfig]) -> Self {
        let mut out = Self::default();
        for field in fields {
            let name = if field.alias_name.is_empty() {
                field.field_name.clone()
            } else {
                field.alias_name.clone()
            };
            match field.tag.as_str() {
                "metric" => out.metrics.push(name),
                "timestamp" => out.time_field = Some(name),
                _ => out.dimensions.push(name),
            }
        }
        out
    }
}

/// Field sets of the two log clustering backends
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendFields {
    /// Raw log index
    pub raw_es: Option<RecordFields>,
    /// Pattern index
    pub pattern_es: Option<RecordFields>,
}

impl BackendFields {
    /// Read `log_cluster_config.backend_fields` from pipeline options
    pub fn from_options(options: &Options) -> Result<Self> {
        let Some(cluster) = options.get_options(keys::LOG_CLUSTER_CONFIG)? else {
            return Ok(Self::default());
        };
        Ok(cluster.decode(keys::BACKEND_FIELDS)?.unwrap_or_default())
    }
}

/// Per-lane runtime settings handed to branching callbacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Lane index
    pub pipeline_count: usize,
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
