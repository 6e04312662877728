//! Process node - runs a transform stage

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Instant, Interval};
use transfer_protocol::Payload;

use crate::channel::{KillSender, PayloadReceiver};
use crate::error::Result;
use crate::node::{Node, NodeRef, SimpleNode};
use crate::scope::BuildScope;
use crate::traits::DataProcessor;

/// Node wrapping a [`DataProcessor`]
///
/// One task feeds input payloads to `process` and calls `finish` once the
/// input closes or the node is stopped. A processor with a non-zero poll
/// period also gets `process(None)` on every tick from the same task, plus
/// one final tick before `finish`.
pub struct ProcessNode {
    inner: SimpleNode,
    processor: Arc<dyn DataProcessor>,
}

impl ProcessNode {
    /// The processor is told its lane index before it is shared
    pub fn new(scope: &BuildScope, mut processor: Box<dyn DataProcessor>) -> Self {
        let index = scope.pipeline_count();
        processor.set_index(index);
        let name = format!("{index}:{processor}");
        Self {
            inner: SimpleNode::new(name, scope.child_token(), scope.channel_size()),
            processor: Arc::from(processor),
        }
    }
}

#[async_trait]
impl Node for ProcessNode {
    fn start(&self, kill: KillSender) {
        self.inner.start(kill.clone());

        let base = Arc::clone(self.inner.base());
        let Some(output) = self.inner.take_output_sender() else {
            tracing::warn!(node = %base.name(), "processor output already closed, not starting");
            return;
        };
        let token = base.token().clone();
        let input = self.inner.input();
        if input.is_none() {
            tracing::warn!(node = %base.name(), "process node has no input");
        }

        let poll = self.processor.poll();
        let processor = Arc::clone(&self.processor);
        let name = base.name().to_string();
        base.spawn_guarded(async move {
            let mut ticker =
                (!poll.is_zero()).then(|| tokio::time::interval_at(Instant::now() + poll, poll));
            loop {
                tokio::select! {
                    biased;
                    _ = next_tick(&mut ticker) => processor.process(None, &output, &kill).await,
                    item = next_payload(input.as_ref()) => match item {
                        Some(payload) => processor.process(Some(payload), &output, &kill).await,
                        None => break,
                    },
                    _ = token.cancelled() => break,
                }
            }

            if ticker.is_some() {
                processor.process(None, &output, &kill).await;
            }
            processor.finish(&output, &kill).await;
            tracing::debug!(node = %name, "processor finished");
        });
        tracing::info!(node = %base.name(), "process node started");
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

/// Next poll tick, never ready without a poll period
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Next input payload, `None` once the input is closed
///
/// Never ready for a node without input.
async fn next_payload(input: Option<&PayloadReceiver>) -> Option<Payload> {
    match input {
        Some(input) => input.recv().await.ok(),
        None => std::future::pending().await,
    }
}

impl fmt::Display for ProcessNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.name())
    }
}
