//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading, validating or reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error - required field missing
    #[error("{component} '{name}' is missing required field '{field}'")]
    MissingField {
        /// Component type (e.g., "pipeline", "shipper")
        component: &'static str,
        /// Name of the component
        name: String,
        /// Missing field name
        field: &'static str,
    },

    /// Validation error - invalid value
    #[error("{component} '{name}' has invalid {field}: {message}")]
    InvalidValue {
        component: &'static str,
        name: String,
        field: &'static str,
        message: String,
    },

    /// Two pipelines share a data id
    #[error("data id {0} is declared by more than one pipeline")]
    DuplicateDataId(i64),

    /// Option map entry has the wrong type
    #[error("option '{key}' expects {expected}, got {found}")]
    InvalidOption {
        key: String,
        expected: &'static str,
        found: String,
    },
}

impl ConfigError {
    /// Create a MissingField error
    pub fn missing_field(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
    ) -> Self {
        Self::MissingField {
            component,
            name: name.into(),
            field,
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            component,
            name: name.into(),
            field,
            message: message.into(),
        }
    }

    /// Create an InvalidOption error
    pub fn invalid_option(key: impl Into<String>, expected: &'static str, found: impl Into<String>) -> Self {
        Self::InvalidOption {
            key: key.into(),
            expected,
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_error() {
        let err = ConfigError::missing_field("pipeline", "1001", "mq_config.cluster_type");
        assert!(err.to_string().contains("pipeline"));
        assert!(err.to_string().contains("1001"));
        assert!(err.to_string().contains("cluster_type"));
    }

    #[test]
    fn test_invalid_option_error() {
        let err = ConfigError::invalid_option("multi_num", "unsigned integer", "\"x\"");
        assert_eq!(
            err.to_string(),
            "option 'multi_num' expects unsigned integer, got \"x\""
        );
    }

    #[test]
    fn test_duplicate_data_id() {
        let err = ConfigError::DuplicateDataId(42);
        assert!(err.to_string().contains("42"));
    }
}
