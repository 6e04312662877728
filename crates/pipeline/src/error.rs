//! Pipeline error types
//!
//! Build-time errors come back from `Builder::finish` and the branching
//! builders. Runtime faults travel over the kill channel as the same type.

use thiserror::Error;

use transfer_config::ConfigError;
use transfer_protocol::PayloadError;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Node input was already wired
    #[error("input channel of {0} has been set")]
    AlreadyConnected(String),

    /// Lookup of a member node failed
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// Adding the edge would create a cycle
    #[error("connect loop detected: {from} => {to}")]
    ConnectLoop { from: String, to: String },

    /// Declared node never reached from the frontend
    #[error("node {0} is not reachable from the frontend")]
    EdgeLeak(String),

    #[error("frontend node not set")]
    MissingFrontend,

    #[error("result table list of {0} is empty")]
    EmptyResultTables(String),

    #[error("unknown frontend type '{name}', available: [{available}]")]
    UnknownFrontend { name: String, available: String },

    #[error("unknown backend type '{name}', available: [{available}]")]
    UnknownBackend { name: String, available: String },

    #[error("unknown processor type '{name}', available: [{available}]")]
    UnknownProcessor { name: String, available: String },

    /// Stop called more often than start
    #[error("node {0} is not started")]
    NotStarted(String),

    /// Frontend finished but the pipeline was not torn down in time
    #[error("frontend {0} finished: timeout")]
    FrontendTimeout(String),

    /// A node task panicked
    #[error("node {node} panic: {message}")]
    Panic { node: String, message: String },

    /// Bulk flush failed
    #[error("flush failed: {0}")]
    Flush(String),

    /// Component reported a runtime fault
    #[error("{component}: {message}")]
    Handler { component: String, message: String },

    #[error("invalid build: {0}")]
    Build(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Several independent errors collected during a build
    #[error("{}", join_errors(.0))]
    Multiple(Vec<PipelineError>),
}

impl PipelineError {
    /// Create a Handler error
    pub fn handler(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a Build error
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    /// Collapse a list of errors, `None` when empty
    pub fn from_many(mut errors: Vec<PipelineError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }

    /// Number of leaf errors
    pub fn count(&self) -> usize {
        match self {
            Self::Multiple(errors) => errors.iter().map(Self::count).sum(),
            _ => 1,
        }
    }
}

fn join_errors(errors: &[PipelineError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::AlreadyConnected("1:noop".into());
        assert_eq!(err.to_string(), "input channel of 1:noop has been set");

        let err = PipelineError::ConnectLoop {
            from: "a".into(),
            to: "b".into(),
        };
        assert!(err.to_string().contains("a => b"));

        let err = PipelineError::UnknownBackend {
            name: "es".into(),
            available: "null, stdout".into(),
        };
        assert!(err.to_string().contains("available: [null, stdout]"));
    }

    #[test]
    fn test_from_many() {
        assert!(PipelineError::from_many(vec![]).is_none());

        let single = PipelineError::from_many(vec![PipelineError::MissingFrontend]).unwrap();
        assert!(matches!(single, PipelineError::MissingFrontend));

        let multiple = PipelineError::from_many(vec![
            PipelineError::EdgeLeak("a".into()),
            PipelineError::EdgeLeak("b".into()),
        ])
        .unwrap();
        assert_eq!(multiple.count(), 2);
        assert!(multiple.to_string().contains("node a"));
        assert!(multiple.to_string().contains("node b"));
    }
}
