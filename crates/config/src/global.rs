//! Global runtime settings
//!
//! These settings apply to every pipeline built by the process.

use std::time::Duration;

use serde::Deserialize;

/// Settings shared by every pipeline
///
/// # Example
///
/// ```toml
/// [global]
/// strict_mode = false
/// channel_size = 1
/// frontend_wait_delay = "1s"
/// stop_timeout = "5s"
///
/// [global.bulk]
/// buffer_size = 2000
/// flush_interval = "1s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Abort the whole build when one result table fails
    /// Default: false (log and skip the table)
    pub strict_mode: bool,

    /// Capacity of the channels between nodes
    /// Default: 1
    pub channel_size: usize,

    /// Dispatch workers per connector input
    /// Default: number of CPU cores
    pub connector_concurrency: usize,

    /// How long a finished frontend waits for teardown before raising a kill
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub frontend_wait_delay: Duration,

    /// Drain grace applied when stopping pipelines
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Defaults for bulk backends
    pub bulk: BulkConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            channel_size: 1,
            connector_concurrency: num_cpus(),
            frontend_wait_delay: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
            bulk: BulkConfig::default(),
        }
    }
}

impl GlobalConfig {
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn with_channel_size(mut self, size: usize) -> Self {
        self.channel_size = size;
        self
    }

    pub fn with_connector_concurrency(mut self, concurrency: usize) -> Self {
        self.connector_concurrency = concurrency;
        self
    }

    pub fn with_frontend_wait_delay(mut self, delay: Duration) -> Self {
        self.frontend_wait_delay = delay;
        self
    }

    /// Channel capacity, never zero
    pub fn effective_channel_size(&self) -> usize {
        self.channel_size.max(1)
    }

    /// Connector workers per input, never zero
    pub fn effective_concurrency(&self) -> usize {
        self.connector_concurrency.max(1)
    }
}

/// Buffering, retry and concurrency defaults for bulk backends
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BulkConfig {
    /// Results buffered before a flush
    /// Default: 2000
    pub buffer_size: usize,

    /// Periodic flush interval
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Retries after a failed flush
    /// Default: 3
    pub flush_retries: usize,

    /// In-flight flushes and pushes per backend
    /// Default: 25
    pub concurrency: usize,

    /// In-flight flushes and pushes across the process
    /// Default: 10000
    pub max_concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            buffer_size: 2000,
            flush_interval: Duration::from_secs(1),
            flush_retries: 3,
            concurrency: 25,
            max_concurrency: 10000,
        }
    }
}

impl BulkConfig {
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_flush_retries(mut self, retries: usize) -> Self {
        self.flush_retries = retries;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Get the number of available CPUs, defaulting to 4 if detection fails
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert!(!config.strict_mode);
        assert_eq!(config.channel_size, 1);
        assert!(config.connector_concurrency > 0);
        assert_eq!(config.frontend_wait_delay, Duration::from_secs(1));
        assert_eq!(config.bulk, BulkConfig::default());
    }

    #[test]
    fn test_bulk_defaults() {
        let bulk = BulkConfig::default();
        assert_eq!(bulk.buffer_size, 2000);
        assert_eq!(bulk.flush_interval, Duration::from_secs(1));
        assert_eq!(bulk.flush_retries, 3);
        assert_eq!(bulk.concurrency, 25);
        assert_eq!(bulk.max_concurrency, 10000);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
strict_mode = true
frontend_wait_delay = "250ms"

[bulk]
flush_interval = "2s"
flush_retries = 1
"#;
        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert!(config.strict_mode);
        assert_eq!(config.frontend_wait_delay, Duration::from_millis(250));
        assert_eq!(config.bulk.flush_interval, Duration::from_secs(2));
        assert_eq!(config.bulk.flush_retries, 1);
        assert_eq!(config.bulk.buffer_size, 2000);
    }

    #[test]
    fn test_effective_values_never_zero() {
        let config = GlobalConfig::default()
            .with_channel_size(0)
            .with_connector_concurrency(0);
        assert_eq!(config.effective_channel_size(), 1);
        assert_eq!(config.effective_concurrency(), 1);
    }
}
