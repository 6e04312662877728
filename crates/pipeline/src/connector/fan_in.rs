//! Several inputs, one output

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::task::TaskTracker;

use super::BaseConnector;
use crate::channel::{KillSender, PayloadReceiver, PayloadSender, payload_channel};
use crate::error::{PipelineError, Result};
use crate::node::{BaseNode, Node, NodeRef};
use crate::scope::BuildScope;

/// Merge connector owning its output node
///
/// # Design
///
/// - `concurrency` forwarders per input, tracked by a drain tracker
/// - the output closes only after every forwarder has exited
/// - the output node is started with the connector and stopped and waited
///   once the merged stream is closed
/// - a second `start` only registers bookkeeping so the matching `stop`
///   stays balanced
pub struct FanInConnector {
    core: Arc<BaseConnector>,
    inputs: Mutex<Vec<PayloadReceiver>>,
    output: Mutex<Option<PayloadSender>>,
    output_node: NodeRef,
    started: AtomicBool,
    output_node_stopped: AtomicBool,
    concurrency: usize,
}

impl FanInConnector {
    pub fn new(scope: &BuildScope, output_node: NodeRef) -> Result<Self> {
        let (tx, rx) = payload_channel(scope.channel_size());
        output_node.connect_from(rx)?;
        Ok(Self {
            core: Arc::new(BaseConnector::new(BaseNode::new(
                format!("fan-in:{output_node}"),
                scope.child_token(),
            ))),
            inputs: Mutex::new(Vec::new()),
            output: Mutex::new(Some(tx)),
            output_node,
            started: AtomicBool::new(false),
            output_node_stopped: AtomicBool::new(false),
            concurrency: scope.concurrency(),
        })
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn output_node(&self) -> &NodeRef {
        &self.output_node
    }

    pub fn input_count(&self) -> usize {
        self.inputs.lock().len()
    }

    fn launch(&self, kill: KillSender) {
        self.output_node.start(kill);

        let Some(output) = self.output.lock().take() else {
            tracing::warn!(node = %self, "fan-in output already closed");
            return;
        };
        let inputs = self.inputs.lock().clone();
        let drain = TaskTracker::new();
        let base = self.core.base();

        for input in inputs {
            for _ in 0..self.concurrency {
                let input = input.clone();
                let output = output.clone();
                let connector = Arc::clone(&self.core);
                let task = base.guard(async move {
                    let token = connector.base().token().clone();
                    loop {
                        let payload = tokio::select! {
                            biased;
                            item = input.recv() => match item {
                                Ok(payload) => payload,
                                Err(_) => break,
                            },
                            _ = token.cancelled() => break,
                        };
                        connector.send_to(&output, payload).await;
                    }
                });
                base.tracker().spawn(drain.track_future(task));
            }
        }
        drain.close();

        let connector = Arc::clone(&self.core);
        base.spawn_guarded(async move {
            drain.wait().await;
            connector.mark_stop();
            drop(output);
            tracing::debug!(node = %connector.base().name(), "fan-in drained, output closed");
        });
    }
}

#[async_trait]
impl Node for FanInConnector {
    fn start(&self, kill: KillSender) {
        self.core.base().start(kill.clone());
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.launch(kill);
    }

    fn stop(&self) -> Result<()> {
        self.core.base().stop()
    }

    async fn wait(&self) -> Result<()> {
        self.core.base().wait().await;
        self.output.lock().take();
        if self.started.load(Ordering::Acquire)
            && !self.output_node_stopped.swap(true, Ordering::AcqRel)
        {
            self.output_node.stop()?;
            self.output_node.wait().await?;
        }
        Ok(())
    }

    fn connect_from(&self, input: PayloadReceiver) -> Result<()> {
        self.inputs.lock().push(input);
        Ok(())
    }

    fn connect_to(&self, node: &NodeRef) -> Result<()> {
        Err(PipelineError::build(format!(
            "connector {self} output node {} has been set when connecting {node}",
            self.output_node
        )))
    }

    fn is_running(&self) -> bool {
        self.core.base().is_running() || self.output_node.is_running()
    }

    fn output(&self) -> Option<PayloadReceiver> {
        self.output_node.output()
    }
}

impl fmt::Display for FanInConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} inputs => {})", self.input_count(), self.output_node)
    }
}
