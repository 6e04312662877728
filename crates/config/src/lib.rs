//! Transfer Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! ```
//! use transfer_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[global]\nstrict_mode = true").unwrap();
//! assert!(config.global.strict_mode);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [global]
//! stop_timeout = "5s"
//!
//! [log]
//! level = "info"
//!
//! [[pipelines]]
//! data_id = 1001
//! processors = ["noop"]
//!
//! [pipelines.mq_config]
//! cluster_type = "file"
//! cluster_config = { path = "input.jsonl" }
//!
//! [[pipelines.result_table_list]]
//! result_table = "demo"
//!
//! [[pipelines.result_table_list.shipper_list]]
//! cluster_type = "stdout"
//! ```

mod error;
mod global;
mod logging;
mod metrics;
mod options;
mod pipeline;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use global::{BulkConfig, GlobalConfig};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use metrics::{MetricsConfig, MetricsFormat};
pub use options::{Options, keys};
pub use pipeline::{
    BackendFields, FieldConfig, PipelineConfig, RecordFields, ResultTableConfig, RuntimeConfig,
    ShipperConfig,
};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime settings shared by every pipeline
    pub global: GlobalConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Metrics reporting configuration
    pub metrics: MetricsConfig,

    /// Pipelines to run
    pub pipelines: Vec<PipelineConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse, normalize and validate
    fn parse(s: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        for pipeline in &mut config.pipelines {
            pipeline.clean();
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
