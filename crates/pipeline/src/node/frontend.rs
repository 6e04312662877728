//! Frontend node - drives a data source

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::{KillSender, PayloadReceiver, send_kill};
use crate::error::{PipelineError, Result};
use crate::node::{Node, NodeRef, SimpleNode};
use crate::scope::BuildScope;
use crate::traits::Frontend;

/// Node wrapping a [`Frontend`]
///
/// One task runs `pull`, then closes the frontend. If the pipeline is not
/// torn down within `wait_delay` afterwards, a `FrontendTimeout` kill is
/// raised so the owner notices the source has finished.
pub struct FrontendNode {
    inner: SimpleNode,
    frontend: Arc<dyn Frontend>,
    wait_delay: Duration,
}

impl FrontendNode {
    pub fn new(scope: &BuildScope, frontend: Box<dyn Frontend>, wait_delay: Duration) -> Self {
        let name = format!("+:{frontend}");
        Self {
            inner: SimpleNode::new(name, scope.child_token(), scope.channel_size()),
            frontend: Arc::from(frontend),
            wait_delay,
        }
    }

    pub fn frontend(&self) -> &Arc<dyn Frontend> {
        &self.frontend
    }
}

#[async_trait]
impl Node for FrontendNode {
    fn start(&self, kill: KillSender) {
        self.inner.start(kill.clone());

        let Some(output) = self.inner.take_output_sender() else {
            tracing::warn!(node = %self, "frontend output already closed, not starting");
            return;
        };

        let base = Arc::clone(self.inner.base());
        let frontend = Arc::clone(&self.frontend);
        let wait_delay = self.wait_delay;
        tracing::info!(node = %base.name(), "frontend node starting");

        self.inner.base().spawn_guarded(async move {
            let token = base.token().clone();

            tokio::select! {
                _ = frontend.pull(&output, &kill) => {}
                _ = token.cancelled() => {
                    tracing::debug!(node = %base.name(), "frontend pull cancelled");
                }
            }
            drop(output);

            if let Err(e) = frontend.close().await {
                tracing::error!(node = %base.name(), error = %e, "close frontend failed");
            }
            tracing::info!(node = %base.name(), "frontend finished");

            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait_delay) => {
                    send_kill(&kill, PipelineError::FrontendTimeout(base.name().to_string()), &token)
                        .await;
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

    fn connect_from(&self, _input: PayloadReceiver) -> Result<()> {
        Err(PipelineError::build(format!("frontend {self} accepts no input")))
    }

    fn connect_to(&self, node: &NodeRef) -> Result<()> {
        self.inner.connect_to(node)
    }

    fn is_running(&self) -> bool {
        self.inner.base().is_running()
    }

    fn output(&self) -> Option<PayloadReceiver> {
        self.inner.output()
    }

    fn no_copy(&self) -> bool {
        self.inner.base().no_copy()
    }

    fn set_no_copy(&self, no_copy: bool) {
        self.inner.base().set_no_copy(no_copy);
    }
}

impl fmt::Display for FrontendNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.name())
    }
}
