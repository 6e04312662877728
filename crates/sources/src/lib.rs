//! Transfer - Sources
//!
//! Frontends that read records and hand them to a pipeline as payloads.
//!
//! # Available Frontends
//!
//! - **file** - JSON lines from a file, or stdin; finishes at EOF
//! - **tcp** - newline-delimited JSON over TCP; runs until stopped
//!
//! # Design Principles
//!
//! - **Zero-copy framing**: lines are split off a `bytes::BytesMut` read
//!   buffer and shared as payload bodies
//! - **Async I/O**: built on `tokio` for non-blocking operations
//! - **Configured by scope**: factories read `mq_config.cluster_config` and
//!   the pipeline's `encoding` options
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::with_builtins();
//! transfer_sources::register(&mut registry);
//!
//! let frontend = registry.create_frontend("file", &scope)?;
//! ```

pub mod file;
pub mod tcp;

mod common;

use transfer_pipeline::{BuildScope, Frontend, Registry, Result};

pub use common::{Encoding, LineDecoder, MetricsSnapshot, SourceError, SourceMetrics};
pub use file::{FileFrontend, FileFrontendConfig};
pub use tcp::{TcpFrontend, TcpFrontendConfig};

/// Register every frontend of this crate
pub fn register(registry: &mut Registry) {
    registry.register_frontend("file", |scope: &BuildScope| -> Result<Box<dyn Frontend>> {
        Ok(Box::new(FileFrontend::from_scope(scope)?))
    });
    registry.register_frontend("tcp", |scope: &BuildScope| -> Result<Box<dyn Frontend>> {
        Ok(Box::new(TcpFrontend::from_scope(scope)?))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register() {
        let mut registry = Registry::new();
        register(&mut registry);
        assert_eq!(registry.frontend_names(), vec!["file", "tcp"]);

        let frontend = registry
            .create_frontend("file", &BuildScope::detached())
            .unwrap();
        assert_eq!(frontend.to_string(), "stdin");
    }
}
