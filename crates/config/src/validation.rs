//! Configuration validation
//!
//! Validates config consistency:
//! - Every pipeline names a frontend type and shipper types
//! - Data ids are unique
//! - Bulk settings are usable

use std::collections::HashSet;

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_bulk(config)?;
    validate_pipelines(config)?;
    Ok(())
}

fn validate_bulk(config: &Config) -> Result<()> {
    let bulk = &config.global.bulk;
    if bulk.buffer_size == 0 {
        return Err(ConfigError::invalid_value(
            "global",
            "bulk",
            "buffer_size",
            "must be greater than 0",
        ));
    }
    if bulk.flush_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "global",
            "bulk",
            "flush_interval",
            "must be greater than 0",
        ));
    }
    if bulk.concurrency == 0 || bulk.max_concurrency < bulk.concurrency {
        return Err(ConfigError::invalid_value(
            "global",
            "bulk",
            "concurrency",
            "must be greater than 0 and at most max_concurrency",
        ));
    }
    Ok(())
}

fn validate_pipelines(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();
    for pipeline in &config.pipelines {
        if !seen.insert(pipeline.data_id) {
            return Err(ConfigError::DuplicateDataId(pipeline.data_id));
        }
        pipeline.validate()?;
    }
    Ok(())
}
