//! Transfer - Collector
//!
//! Loads a configuration, builds its pipelines from the registered
//! components and runs them until shutdown.
//!
//! # Example
//!
//! ```ignore
//! let config = Config::from_file("configs/config.toml")?;
//! transfer_collector::logging::init(&config.log, None)?;
//! let summary = Collector::new(config).run(shutdown_signal()).await?;
//! ```

pub mod logging;
pub mod report;
pub mod runner;

pub use report::MetricsReporter;
pub use runner::{Collector, RunSummary, build_pipeline, default_registry, shutdown_signal};
