//! Transfer - Pipeline
//!
//! The runtime that moves payloads from a frontend through processors to
//! backends over bounded channels.
//!
//! # Architecture
//!
//! ```text
//! [Frontend]          [Processors]                 [Backends]
//!  +:kafka ──→ 0:decode ──fan-out──┬──→ 0:etl ──→ $:influx ─┐ chain
//!                                  │                 └──→ $:es
//!                                  └──→ 0:etl ──→ $:bulk(file)
//! ```
//!
//! # Key Design
//!
//! - **Nodes**: every vertex implements [`Node`]; frontends, processors and
//!   backends are wrapped by [`FrontendNode`], [`ProcessNode`] and
//!   [`BackendNode`]
//! - **Connectors**: fan-out, round-robin, fan-in, chain and group nodes
//!   reshape the graph without touching payloads
//! - **Builder**: an arena of declared nodes and edges, validated (no
//!   cycles, no unreachable nodes) and flattened into a [`Pipeline`]
//! - **Kill channel**: runtime faults and panics of node tasks are reported
//!   on one channel per pipeline; the owner decides what to do
//! - **Bulk adapter**: buffered, bounded-retry batch writes behind the
//!   plain [`Backend`] contract
//!
//! # Example
//!
//! ```ignore
//! let scope = BuildScope::new(global, pipeline_config);
//! let mut builder = ConfigBuilder::new(scope, Arc::new(registry), "pipeline:1");
//! let pipeline = builder.build_branching(None, false, &mut |b, scope, from, to| {
//!     let etl = b.data_processor(scope, "flat_batch")?;
//!     b.connect_refs(from, &etl);
//!     b.connect_refs(&etl, to);
//!     Ok(())
//! })?;
//!
//! let mut kill = pipeline.start();
//! // watch `kill`, then
//! pipeline.stop(Duration::from_secs(5)).await?;
//! pipeline.wait().await?;
//! ```

mod builder;
mod bulk;
mod channel;
mod config_builder;
mod connector;
mod cutter;
mod error;
mod metrics;
mod node;
mod passer;
mod pipeline;
mod registry;
mod scope;
mod traits;

pub use builder::{Builder, NodeId};
pub use bulk::{
    BulkBackendAdapter, BulkHandler, ChainedPermit, ChainingSemaphore, global_flush_semaphore,
    global_push_semaphore,
};
pub use channel::{
    KillReceiver, KillSender, PayloadReceiver, PayloadSender, kill_channel, payload_channel,
    send_kill, send_or_cancel,
};
pub use config_builder::{BranchingCallback, ConfigBuilder};
pub use connector::{
    BaseConnector, ChainConnector, FanInConnector, FanOutConnector, GroupConnector,
    MultiOutputConnector, RoundRobinConnector,
};
pub use cutter::CutterBackend;
pub use error::{PipelineError, Result};
pub use metrics::{MetricsBoard, MetricsSnapshot, ProcessorMetrics};
pub use node::{
    BackendNode, BaseNode, FrontendNode, GluttonousNode, Node, NodeRef, ProcessNode, SimpleNode,
    same_node,
};
pub use passer::Passer;
pub use pipeline::Pipeline;
pub use registry::{BackendFactory, FrontendFactory, ProcessorFactory, Registry};
pub use scope::BuildScope;
pub use traits::{Backend, DataProcessor, Frontend};

// Re-export key types from dependencies for convenience
pub use tokio_util::sync::CancellationToken;
pub use transfer_protocol::{EtlRecord, Payload, PayloadFlag, derive_payload};

#[cfg(test)]
mod testutil;
