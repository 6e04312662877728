//! Gluttonous node - a terminal that swallows everything

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::channel::{KillSender, PayloadReceiver};
use crate::error::{PipelineError, Result};
use crate::node::{Node, NodeRef, SimpleNode};
use crate::scope::BuildScope;

/// Black-hole sink used when a branch has no real backend
pub struct GluttonousNode {
    inner: SimpleNode,
    consumed: Arc<AtomicU64>,
}

impl GluttonousNode {
    pub fn new(scope: &BuildScope) -> Self {
        Self {
            inner: SimpleNode::without_output(
                "gluttonous",
                scope.child_token(),
                scope.channel_size(),
            ),
            consumed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Payloads swallowed so far
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Node for GluttonousNode {
    fn start(&self, kill: KillSender) {
        self.inner.start(kill);

        let Some(input) = self.inner.input() else {
            return;
        };
        let token = self.inner.base().token().clone();
        let consumed = Arc::clone(&self.consumed);
        self.inner.base().spawn_guarded(async move {
            loop {
                tokio::select! {
                    biased;
                    item = input.recv() => match item {
                        Ok(payload) => {
                            consumed.fetch_add(1, Ordering::Relaxed);
                            tracing::trace!(sn = payload.sn(), "gluttonous node swallowed payload");
                        }
                        Err(_) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    fn stop(&self) -> Result<()> {
        self.inner.stop()
    }

    async fn wait(&self) -> Result<()> {
        self.inner.wait().await
    }

    fn connect_from(&self, input: PayloadReceiver) -> Result<()> {
        self.inner.connect_from(input)
    }

    fn connect_to(&self, node: &NodeRef) -> Result<()> {
        Err(PipelineError::build(format!(
            "{self} has no output, cannot connect to {node}"
        )))
    }

    fn is_running(&self) -> bool {
        self.inner.base().is_running()
    }

    fn output(&self) -> Option<PayloadReceiver> {
        None
    }
}

impl fmt::Display for GluttonousNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.name())
    }
}
