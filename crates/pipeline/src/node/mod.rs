//! Graph nodes
//!
//! Every vertex of a pipeline graph implements [`Node`]: it can be started
//! with the shared kill channel, stopped, waited on and wired to other
//! nodes through payload channels.
//!
//! # Lifecycle
//!
//! ```text
//! start(kill) ──→ tasks running ──→ stop() ──→ wait() ──→ output closed
//!                                   cancel      join tasks, drop sender
//! ```
//!
//! Each `start` must be matched by one `stop`; `wait` returns once every
//! start has been stopped and every task of the node has exited.

mod backend;
mod base;
mod frontend;
mod gluttonous;
mod process;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::{KillSender, PayloadReceiver};
use crate::error::Result;

pub use backend::BackendNode;
pub use base::{BaseNode, SimpleNode};
pub(crate) use base::panic_message;
pub use frontend::FrontendNode;
pub use gluttonous::GluttonousNode;
pub use process::ProcessNode;

/// Graph vertex
#[async_trait]
pub trait Node: Send + Sync + fmt::Display {
    fn start(&self, kill: KillSender);

    fn stop(&self) -> Result<()>;

    async fn wait(&self) -> Result<()>;

    /// Attach an input channel
    fn connect_from(&self, input: PayloadReceiver) -> Result<()>;

    /// Wire this node's output into `node`
    fn connect_to(&self, node: &NodeRef) -> Result<()>;

    /// Output channel, if the node has one
    fn output(&self) -> Option<PayloadReceiver>;

    /// Whether each payload should be claimed by exactly one successor
    fn no_copy(&self) -> bool {
        false
    }

    fn set_no_copy(&self, _no_copy: bool) {}

    /// Whether any task of the node is still alive
    fn is_running(&self) -> bool {
        false
    }
}

/// Shared node handle
pub type NodeRef = Arc<dyn Node>;

/// Identity comparison of node handles
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[cfg(test)]
#[path = "node_test.rs"]
mod tests;
