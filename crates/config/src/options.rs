//! Option maps
//!
//! Pipelines, result tables and shippers carry free-form option maps. The
//! getters here never panic: a missing key is `Ok(None)` (or the supplied
//! default) and a value of the wrong type is `ConfigError::InvalidOption`.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// Well-known option keys
pub mod keys {
    /// Payload charset of the frontend
    pub const ENCODING: &str = "encoding";
    /// Drop payloads that are not valid in the declared charset
    pub const ENCODING_STRICT: &str = "encoding_strict";
    /// Pipeline feeds the log clustering branches
    pub const IS_LOG_CLUSTER: &str = "is_log_cluster";
    /// Log clustering settings (nested object)
    pub const LOG_CLUSTER_CONFIG: &str = "log_cluster_config";
    /// Backend field sets inside `log_cluster_config`
    pub const BACKEND_FIELDS: &str = "backend_fields";
    /// Parallel lanes of a result table
    pub const MULTI_NUM: &str = "multi_num";
    /// Coerce dynamic metric values to floats before cutting
    pub const DYNAMIC_METRICS_AS_FLOAT: &str = "dynamic_metrics_as_float";
    /// Skip splitting multi-metric records at the backend
    pub const DISABLE_METRIC_CUTTER: &str = "disable_metric_cutter";
    /// Array field expanded by the `flat_batch` processor
    pub const FLAT_BATCH_KEY: &str = "flat_batch_key";
}

/// Free-form option map
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(ConfigError::invalid_option(key, "bool", other.to_string())),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.get_bool(key)?.unwrap_or(default))
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(ConfigError::invalid_option(key, "string", other.to_string())),
        }
    }

    pub fn str_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get_str(key)?.unwrap_or(default).to_string())
    }

    /// Unsigned integer; numeric strings are accepted
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| ConfigError::invalid_option(key, "unsigned integer", n.to_string())),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::invalid_option(key, "unsigned integer", format!("{s:?}"))),
            Some(other) => Err(ConfigError::invalid_option(
                key,
                "unsigned integer",
                other.to_string(),
            )),
        }
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        Ok(self
            .get_u64(key)?
            .map(|v| usize::try_from(v).unwrap_or(usize::MAX))
            .unwrap_or(default))
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(ConfigError::invalid_option(key, "number", other.to_string())),
        }
    }

    /// Duration given as a humantime string (`"1s"`) or integer seconds
    pub fn get_duration(&self, key: &str) -> Result<Option<Duration>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => humantime::parse_duration(s)
                .map(Some)
                .map_err(|e| ConfigError::invalid_option(key, "duration", format!("{s:?} ({e})"))),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|secs| Some(Duration::from_secs(secs)))
                .ok_or_else(|| ConfigError::invalid_option(key, "duration", n.to_string())),
            Some(other) => Err(ConfigError::invalid_option(key, "duration", other.to_string())),
        }
    }

    pub fn duration_or(&self, key: &str, default: Duration) -> Result<Duration> {
        Ok(self.get_duration(key)?.unwrap_or(default))
    }

    /// Nested option map
    pub fn get_options(&self, key: &str) -> Result<Option<Options>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Options(map.clone()))),
            Some(other) => Err(ConfigError::invalid_option(key, "object", other.to_string())),
        }
    }

    /// Decode an entry into any deserializable type
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| {
                    ConfigError::invalid_option(key, std::any::type_name::<T>(), e.to_string())
                }),
        }
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
#[path = "options_test.rs"]
mod tests;
