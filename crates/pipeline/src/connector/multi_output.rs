//! One input, several outputs

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::BaseConnector;
use crate::channel::{KillSender, PayloadReceiver, PayloadSender, payload_channel};
use crate::error::{PipelineError, Result};
use crate::node::{BaseNode, Node, NodeRef, same_node};
use crate::scope::BuildScope;

/// Rounds after which the round-robin counter starts over
const ROUND_ROBIN_RESET_ROUNDS: usize = 500;

/// Shared state of fan-out and round-robin connectors
///
/// Every `connect_to` creates a dedicated channel for the new output. The
/// connector keeps its senders until `start` hands them to the dispatch
/// tasks, so each output closes once the last dispatcher exits.
pub struct MultiOutputConnector {
    core: Arc<BaseConnector>,
    input_name: String,
    input: Mutex<Option<PayloadReceiver>>,
    outputs: Mutex<Vec<PayloadSender>>,
    targets: Mutex<Vec<NodeRef>>,
    channel_size: usize,
    concurrency: usize,
}

impl MultiOutputConnector {
    pub fn new(scope: &BuildScope, kind: &str, from: &NodeRef) -> Self {
        let name = format!("{kind}:{from}");
        Self {
            core: Arc::new(BaseConnector::new(BaseNode::new(name, scope.child_token()))),
            input_name: from.to_string(),
            input: Mutex::new(from.output()),
            outputs: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
            channel_size: scope.channel_size(),
            concurrency: scope.concurrency(),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn output_count(&self) -> usize {
        self.targets.lock().len()
    }

    /// The upstream channel is taken once; later announcements of the same
    /// upstream are ignored
    fn connect_from(&self, input: PayloadReceiver) -> Result<()> {
        let mut slot = self.input.lock();
        if slot.is_none() {
            *slot = Some(input);
        }
        Ok(())
    }

    fn connect_to(&self, node: &NodeRef) -> Result<()> {
        let connected = self.targets.lock().iter().any(|t| same_node(t, node));
        if connected {
            return Err(PipelineError::build(format!(
                "output node {node} already connected to {self}"
            )));
        }

        let (tx, rx) = payload_channel(self.channel_size);
        node.connect_from(rx)?;
        self.outputs.lock().push(tx);
        self.targets.lock().push(Arc::clone(node));
        Ok(())
    }

    /// Start bookkeeping and hand input and senders to the caller
    fn begin(&self, kill: KillSender) -> Option<(PayloadReceiver, Arc<Vec<PayloadSender>>)> {
        self.core.base().start(kill);
        let outputs = std::mem::take(&mut *self.outputs.lock());
        let Some(input) = self.input.lock().clone() else {
            tracing::warn!(node = %self, "connector has no input");
            return None;
        };
        if outputs.is_empty() {
            tracing::warn!(node = %self, "connector has no output");
        }
        Some((input, Arc::new(outputs)))
    }

    fn stop(&self) -> Result<()> {
        self.core.mark_stop();
        self.core.base().stop()
    }

    async fn wait(&self) -> Result<()> {
        self.core.base().wait().await;
        self.outputs.lock().clear();
        Ok(())
    }
}

impl fmt::Display for MultiOutputConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} => ", self.input_name)?;
        let targets = self.targets.lock();
        for (index, target) in targets.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{target}")?;
        }
        f.write_str(")")
    }
}

/// Broadcast: every payload goes to every output
pub struct FanOutConnector {
    inner: MultiOutputConnector,
}

impl FanOutConnector {
    pub fn new(scope: &BuildScope, from: &NodeRef) -> Self {
        Self {
            inner: MultiOutputConnector::new(scope, "fan-out", from),
        }
    }

    #[must_use]
    pub fn with_concurrency(self, concurrency: usize) -> Self {
        Self {
            inner: self.inner.with_concurrency(concurrency),
        }
    }
}

#[async_trait]
impl Node for FanOutConnector {
    fn start(&self, kill: KillSender) {
        let Some((input, outputs)) = self.inner.begin(kill) else {
            return;
        };

        let core = &self.inner.core;
        for _ in 0..self.inner.concurrency {
            let input = input.clone();
            let outputs = Arc::clone(&outputs);
            let connector = Arc::clone(core);
            core.base().spawn_guarded(async move {
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
                    for output in outputs.iter() {
                        connector.send_to(output, payload.clone()).await;
                    }
                }
            });
        }
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
        self.inner.core.base().is_running()
    }

    fn output(&self) -> Option<PayloadReceiver> {
        None
    }
}

impl fmt::Display for FanOutConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

/// Load balancing: each payload goes to exactly one output
///
/// The target is `count % outputs`, with the counter shared by all
/// dispatchers so the rotation stays exact under concurrency.
pub struct RoundRobinConnector {
    inner: MultiOutputConnector,
    counter: Arc<AtomicUsize>,
}

impl RoundRobinConnector {
    pub fn new(scope: &BuildScope, from: &NodeRef) -> Self {
        Self {
            inner: MultiOutputConnector::new(scope, "round-robin", from),
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_concurrency(self, concurrency: usize) -> Self {
        Self {
            inner: self.inner.with_concurrency(concurrency),
            counter: self.counter,
        }
    }
}

/// Next output index for `len` outputs
fn next_index(counter: &AtomicUsize, len: usize) -> usize {
    let count = counter.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
    let index = count % len;
    if index == 0 && count / len > ROUND_ROBIN_RESET_ROUNDS {
        // only reset if nobody advanced the counter meanwhile, so the
        // rotation continues at index 1 either way
        let _ = counter.compare_exchange(count, 0, Ordering::AcqRel, Ordering::Relaxed);
    }
    index
}

#[async_trait]
impl Node for RoundRobinConnector {
    fn start(&self, kill: KillSender) {
        let Some((input, outputs)) = self.inner.begin(kill) else {
            return;
        };
        if outputs.is_empty() {
            return;
        }

        let core = &self.inner.core;
        for _ in 0..self.inner.concurrency {
            let input = input.clone();
            let outputs = Arc::clone(&outputs);
            let connector = Arc::clone(core);
            let counter = Arc::clone(&self.counter);
            core.base().spawn_guarded(async move {
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
                    let index = next_index(&counter, outputs.len());
                    connector.send_to(&outputs[index], payload).await;
                }
            });
        }
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
        self.inner.core.base().is_running()
    }

    fn output(&self) -> Option<PayloadReceiver> {
        None
    }
}

impl fmt::Display for RoundRobinConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_index_rotates() {
        let counter = AtomicUsize::new(0);
        let picks: Vec<usize> = (0..6).map(|_| next_index(&counter, 3)).collect();
        assert_eq!(picks, vec![1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_next_index_resets_without_skipping() {
        let counter = AtomicUsize::new(0);
        let len = 2;
        let total = (ROUND_ROBIN_RESET_ROUNDS + 5) * len;
        let mut hits = [0usize; 2];
        for _ in 0..total {
            hits[next_index(&counter, len)] += 1;
        }
        assert_eq!(hits[0], hits[1]);
        assert!(counter.load(Ordering::Relaxed) < total);
    }
}
