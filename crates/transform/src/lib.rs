//! Transfer - Transform
//!
//! Data processors placed between a pipeline's frontend and its backends.
//!
//! # Available Processors
//!
//! - **noop** - forwards payloads unchanged
//! - **flat_batch** - splits batched reports into one record per item
//!
//! # Design Principles
//!
//! - **Fast**: processors should add microseconds, not milliseconds
//! - **Non-blocking**: never block on I/O or external services
//! - **Lane-local**: each lane of a multi-lane table gets its own instance,
//!   told its lane through `set_index`
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::with_builtins();
//! transfer_transform::register(&mut registry);
//!
//! let processor = registry.create_processor("flat_batch", &scope)?;
//! ```

pub mod flat_batch;
pub mod noop;

use transfer_pipeline::{BuildScope, DataProcessor, Registry, Result};

pub use flat_batch::{DEFAULT_BATCH_KEY, FlatBatchProcessor};
pub use noop::NoopProcessor;

/// Register every processor of this crate
pub fn register(registry: &mut Registry) {
    registry.register_processor("noop", |_: &BuildScope| -> Result<Box<dyn DataProcessor>> {
        Ok(Box::new(NoopProcessor::new()))
    });
    registry.register_processor(
        "flat_batch",
        |scope: &BuildScope| -> Result<Box<dyn DataProcessor>> {
            Ok(Box::new(FlatBatchProcessor::from_scope(scope)?))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register() {
        let mut registry = Registry::with_builtins();
        register(&mut registry);
        assert_eq!(
            registry.processor_names(),
            vec!["flat_batch", "noop", "passer"]
        );

        let processor = registry
            .create_processor("flat_batch", &BuildScope::detached())
            .unwrap();
        assert_eq!(processor.to_string(), "flat_batch:0");
    }
}
