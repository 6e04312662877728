//! Runnable pipeline
//!
//! A flat, ordered node list produced by the builder. The head is the
//! frontend, the tails are everything after it in visit order.

use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::channel::{KillReceiver, KillSender, kill_channel};
use crate::error::{PipelineError, Result};
use crate::node::NodeRef;

/// How often `stop` checks whether the tails went quiet
const QUIESCENCE_POLL: Duration = Duration::from_millis(10);

/// Ordered set of started nodes sharing one kill channel
pub struct Pipeline {
    name: String,
    token: CancellationToken,
    nodes: Vec<NodeRef>,
    kill: Mutex<Option<KillSender>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, token: CancellationToken, nodes: Vec<NodeRef>) -> Self {
        Self {
            name: name.into(),
            token,
            nodes,
            kill: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn head(&self) -> Option<&NodeRef> {
        self.nodes.first()
    }

    pub fn tails(&self) -> &[NodeRef] {
        self.nodes.get(1..).unwrap_or_default()
    }

    /// Start every node in order and hand back the kill channel
    pub fn start(&self) -> KillReceiver {
        let (tx, rx) = kill_channel(self.nodes.len() + 1);
        for node in &self.nodes {
            node.start(tx.clone());
        }
        *self.kill.lock() = Some(tx);
        tracing::info!(pipeline = %self.name, nodes = self.nodes.len(), "pipeline started");
        rx
    }

    /// Stop the pipeline
    ///
    /// With a zero timeout every node is stopped at once. Otherwise only
    /// the head is stopped first; the tails follow once they have drained
    /// what is in flight or `timeout` has elapsed, whichever comes first.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        tracing::info!(pipeline = %self.name, ?timeout, "stopping pipeline");
        let Some((head, tails)) = self.nodes.split_first() else {
            return Ok(());
        };

        let mut errors = Vec::new();
        if let Err(e) = head.stop() {
            errors.push(e);
        }

        if !timeout.is_zero() {
            let quiet = async {
                while tails.iter().any(|node| node.is_running()) {
                    tokio::time::sleep(QUIESCENCE_POLL).await;
                }
            };
            tokio::select! {
                _ = quiet => {
                    tracing::debug!(pipeline = %self.name, "pipeline drained");
                }
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(pipeline = %self.name, ?timeout, "pipeline not drained in time");
                }
                _ = self.token.cancelled() => {}
            }
        }

        for node in tails {
            if let Err(e) = node.stop() {
                errors.push(e);
            }
        }
        PipelineError::from_many(errors).map_or(Ok(()), Err)
    }

    /// Cancel the pipeline, close the kill channel and wait for every node
    ///
    /// Call after `stop`.
    pub async fn wait(&self) -> Result<()> {
        self.token.cancel();
        self.kill.lock().take();

        let mut errors = Vec::new();
        for node in &self.nodes {
            if let Err(e) = node.wait().await {
                tracing::warn!(pipeline = %self.name, node = %node, error = %e, "wait node failed");
                errors.push(e);
            }
        }
        tracing::info!(pipeline = %self.name, "pipeline finished");
        PipelineError::from_many(errors).map_or(Ok(()), Err)
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
