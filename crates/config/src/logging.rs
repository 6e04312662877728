//! Logging configuration
//!
//! Controls the `tracing` subscriber installed by the collector binary.

use serde::Deserialize;

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    /// Normal operation (default)
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output (default)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging configuration
///
/// # Example
///
/// ```toml
/// [log]
/// level = "info"
/// format = "text"
/// directives = ["transfer_pipeline=debug"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level
    pub level: LogLevel,

    /// Output format (text, json)
    pub format: LogFormat,

    /// Extra per-target filter directives
    pub directives: Vec<String>,
}

impl LogConfig {
    /// Build an `EnvFilter` compatible directive string
    pub fn filter_directive(&self) -> String {
        let mut directive = self.level.as_str().to_string();
        for extra in &self.directives {
            directive.push(',');
            directive.push_str(extra);
        }
        directive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty() {
        let config: LogConfig = toml::from_str("").unwrap();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.filter_directive(), "info");
    }

    #[test]
    fn test_filter_directive_with_overrides() {
        let toml = r#"
level = "warn"
format = "json"
directives = ["transfer_pipeline=debug", "transfer_sinks=trace"]
"#;
        let config: LogConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(
            config.filter_directive(),
            "warn,transfer_pipeline=debug,transfer_sinks=trace"
        );
    }
}
