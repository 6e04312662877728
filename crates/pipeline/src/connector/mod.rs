//! Connectors - topology-only nodes
//!
//! Connectors reshape the graph without touching payloads:
//!
//! ```text
//! FanOut      in ──┬──→ a        every payload to every output
//!                  └──→ b
//! RoundRobin  in ──┬──→ a        each payload to exactly one output
//!                  └──→ b
//! FanIn       a ──┐
//!             b ──┴──→ out       merge inputs, close after all drained
//! Chain       {a → b → c}        linear sequence presented as one node
//! Group       master + followers sharing one lifecycle
//! ```

mod chain;
mod fan_in;
mod group;
mod multi_output;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use transfer_protocol::Payload;

use crate::channel::{PayloadSender, send_or_cancel};
use crate::node::BaseNode;

pub use chain::ChainConnector;
pub use fan_in::FanInConnector;
pub use group::GroupConnector;
pub use multi_output::{FanOutConnector, MultiOutputConnector, RoundRobinConnector};

/// Bookkeeping shared by connectors that move payloads
pub struct BaseConnector {
    base: Arc<BaseNode>,
    stopped: AtomicBool,
}

impl BaseConnector {
    pub fn new(base: BaseNode) -> Self {
        Self {
            base: Arc::new(base),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn base(&self) -> &Arc<BaseNode> {
        &self.base
    }

    pub fn mark_stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Forward one payload unless the connector is stopped or cancelled
    pub async fn send_to(&self, output: &PayloadSender, payload: Payload) -> bool {
        if self.is_stopped() {
            return false;
        }
        send_or_cancel(output, payload, self.base.token()).await
    }
}

#[cfg(test)]
#[path = "connector_test.rs"]
mod tests;
