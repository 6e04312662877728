//! Linear sequence of nodes presented as one node

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::channel::{KillSender, PayloadReceiver};
use crate::error::{PipelineError, Result};
use crate::node::{BaseNode, Node, NodeRef};
use crate::scope::BuildScope;

/// Chain of nodes wired one after another
///
/// Input goes to the first member, output comes from the last. Lifecycle
/// calls reach every member in order.
pub struct ChainConnector {
    base: Arc<BaseNode>,
    nodes: Mutex<Vec<NodeRef>>,
}

impl ChainConnector {
    pub fn new(scope: &BuildScope, nodes: impl IntoIterator<Item = NodeRef>) -> Result<Self> {
        let chain = Self {
            base: Arc::new(BaseNode::new("chain", scope.child_token())),
            nodes: Mutex::new(Vec::new()),
        };
        for node in nodes {
            chain.connect(node)?;
        }
        Ok(chain)
    }

    /// Append `node`, wiring the current last member into it
    pub fn connect(&self, node: NodeRef) -> Result<()> {
        let mut nodes = self.nodes.lock();
        if let Some(last) = nodes.last() {
            last.connect_to(&node)?;
        }
        nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> Vec<NodeRef> {
        self.nodes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    fn first(&self) -> Result<NodeRef> {
        let node = self.nodes.lock().first().cloned();
        node.ok_or_else(|| PipelineError::ItemNotFound(format!("first node of {self}")))
    }

    fn last(&self) -> Result<NodeRef> {
        let node = self.nodes.lock().last().cloned();
        node.ok_or_else(|| PipelineError::ItemNotFound(format!("last node of {self}")))
    }
}

#[async_trait]
impl Node for ChainConnector {
    fn start(&self, kill: KillSender) {
        self.base.start(kill.clone());
        for node in self.nodes() {
            node.start(kill.clone());
        }
    }

    fn stop(&self) -> Result<()> {
        for node in self.nodes() {
            node.stop()?;
        }
        self.base.stop()
    }

    async fn wait(&self) -> Result<()> {
        for node in self.nodes() {
            node.wait().await?;
        }
        self.base.wait().await;
        Ok(())
    }

    fn connect_from(&self, input: PayloadReceiver) -> Result<()> {
        self.first()?.connect_from(input)
    }

    fn connect_to(&self, node: &NodeRef) -> Result<()> {
        self.last()?.connect_to(node)
    }

    fn is_running(&self) -> bool {
        self.nodes().iter().any(|n| n.is_running())
    }

    fn output(&self) -> Option<PayloadReceiver> {
        self.nodes.lock().last().and_then(|n| n.output())
    }
}

impl fmt::Display for ChainConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        let nodes = self.nodes.lock();
        for (index, node) in nodes.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{node}")?;
        }
        f.write_str("}")
    }
}
