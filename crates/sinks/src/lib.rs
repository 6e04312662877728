//! Transfer - Sinks
//!
//! Backends that take payloads off the end of a pipeline.
//!
//! # Available Backends
//!
//! | Backend | Purpose | Batched |
//! |---------|---------|---------|
//! | `null` | Benchmarking (discard all) | No |
//! | `stdout` | Debug output | Yes |
//! | `file` | JSON lines on disk | Yes |
//!
//! Batched backends run behind [`BulkBackendAdapter`], which buffers
//! records and retries failed writes. Setting `storage_config.cut_metrics`
//! additionally splits multi-metric records through [`CutterBackend`].
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::with_builtins();
//! transfer_sinks::register(&mut registry);
//!
//! let backend = registry.create_backend("stdout", &scope)?;
//! ```

pub mod file;
pub mod null;
pub mod stdout;

mod common;

use transfer_pipeline::{
    Backend, BuildScope, BulkBackendAdapter, BulkHandler, CutterBackend, Registry, Result,
};

pub use common::{MetricsSnapshot, Projection, SinkError, SinkMetrics, project};
pub use file::{FileConfig, FileHandler};
pub use null::{NullBackend, NullBackendMetrics};
pub use stdout::{StdoutConfig, StdoutHandler};

/// Register every backend of this crate
pub fn register(registry: &mut Registry) {
    registry.register_backend("null", |scope: &BuildScope| -> Result<Box<dyn Backend>> {
        Ok(Box::new(NullBackend::from_scope(scope)))
    });
    registry.register_backend("stdout", |scope: &BuildScope| -> Result<Box<dyn Backend>> {
        bulk(scope, StdoutHandler::from_scope(scope)?)
    });
    registry.register_backend("file", |scope: &BuildScope| -> Result<Box<dyn Backend>> {
        bulk(scope, FileHandler::from_scope(scope)?)
    });
}

/// Put a handler behind the bulk adapter, and the cutter when asked
fn bulk<H: BulkHandler>(scope: &BuildScope, handler: H) -> Result<Box<dyn Backend>> {
    let backend: Box<dyn Backend> = Box::new(BulkBackendAdapter::from_scope(scope, handler));
    let cut = match scope.shipper() {
        Some(shipper) => shipper.storage_config.bool_or("cut_metrics", false)?,
        None => false,
    };
    if cut {
        CutterBackend::wrap(scope, backend)
    } else {
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use transfer_config::ShipperConfig;

    use super::*;

    #[test]
    fn test_register() {
        let mut registry = Registry::new();
        register(&mut registry);

        assert_eq!(registry.backend_names(), vec!["file", "null", "stdout"]);

        let backend = registry
            .create_backend("null", &BuildScope::detached())
            .unwrap();
        assert_eq!(backend.to_string(), "null");

        let backend = registry
            .create_backend("stdout", &BuildScope::detached())
            .unwrap();
        assert_eq!(backend.to_string(), "bulk:stdout");
    }

    #[test]
    fn test_file_needs_path() {
        let mut registry = Registry::new();
        register(&mut registry);

        let scope = BuildScope::detached().for_shipper(Arc::new(ShipperConfig::new("file")));
        assert!(registry.create_backend("file", &scope).is_err());
    }

    #[test]
    fn test_cut_metrics_wraps_cutter() {
        let plain = BuildScope::detached().for_shipper(Arc::new(ShipperConfig::new("stdout")));
        let backend = bulk(&plain, StdoutHandler::from_scope(&plain).unwrap()).unwrap();
        assert_eq!(backend.to_string(), "bulk:stdout");

        let shipper = ShipperConfig::new("stdout").with_storage_option("cut_metrics", true);
        let cut = BuildScope::detached().for_shipper(Arc::new(shipper));
        let backend = bulk(&cut, StdoutHandler::from_scope(&cut).unwrap()).unwrap();
        assert_eq!(backend.to_string(), "cutter:bulk:stdout");
    }
}
