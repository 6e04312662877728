//! Base node bookkeeping shared by every node kind

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::channel::{KillSender, PayloadReceiver, PayloadSender, payload_channel};
use crate::error::{PipelineError, Result};
use crate::node::NodeRef;

/// Name, cancellation, task tracking and kill channel of a node
///
/// # Design
///
/// - `starts` counts outstanding `start` calls; the tracker is closed when
///   the last one is stopped, so `wait` blocks until then
/// - `wait` without any start returns immediately
/// - stopping more often than starting is `PipelineError::NotStarted`
#[derive(Debug)]
pub struct BaseNode {
    name: String,
    token: CancellationToken,
    tracker: TaskTracker,
    starts: AtomicUsize,
    kill: Mutex<Option<KillSender>>,
    no_copy: AtomicBool,
}

impl BaseNode {
    pub fn new(name: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            token,
            tracker: TaskTracker::new(),
            starts: AtomicUsize::new(0),
            kill: Mutex::new(None),
            no_copy: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn kill_sender(&self) -> Option<KillSender> {
        self.kill.lock().clone()
    }

    /// Whether any task of the node is still alive
    pub fn is_running(&self) -> bool {
        !self.tracker.is_empty()
    }

    pub fn no_copy(&self) -> bool {
        self.no_copy.load(Ordering::Relaxed)
    }

    pub fn set_no_copy(&self, no_copy: bool) {
        self.no_copy.store(no_copy, Ordering::Relaxed);
    }

    /// Register one start and keep the kill channel
    pub fn start(&self, kill: KillSender) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.kill.lock() = Some(kill);
    }

    /// Cancel the node and release one start
    pub fn stop(&self) -> Result<()> {
        let previous = self
            .starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| PipelineError::NotStarted(self.name.clone()))?;
        self.token.cancel();
        if previous == 1 {
            self.tracker.close();
        }
        tracing::debug!(node = %self.name, "node stopped");
        Ok(())
    }

    /// Wait for every start to be stopped and every task to exit
    pub async fn wait(&self) {
        if self.starts.load(Ordering::SeqCst) == 0 {
            self.tracker.close();
        }
        self.tracker.wait().await;
        self.kill.lock().take();
    }

    /// Report `err` on the kill channel without blocking the caller
    ///
    /// Gives up once the node is cancelled.
    pub fn kill(&self, err: PipelineError) {
        let Some(kill) = self.kill_sender() else {
            tracing::warn!(node = %self.name, error = %err, "kill channel not set, error dropped");
            return;
        };

        let token = self.token.clone();
        let name = self.name.clone();
        self.tracker.spawn(async move {
            tracing::warn!(node = %name, error = %err, "sending kill signal");
            tokio::select! {
                biased;
                result = kill.send(err) => {
                    if result.is_err() {
                        tracing::debug!(node = %name, "kill channel closed");
                    }
                }
                _ = token.cancelled() => {
                    tracing::debug!(node = %name, "node cancelled, kill signal aborted");
                }
            }
        });
    }

    /// Wrap `fut` so that a panic becomes a kill signal
    pub fn guard<F>(self: &Arc<Self>, fut: F) -> impl Future<Output = ()> + Send + 'static
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let base = Arc::clone(self);
        async move {
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                let message = panic_message(panic.as_ref());
                tracing::error!(node = %base.name, panic = %message, "node task panicked");
                base.kill(PipelineError::Panic {
                    node: base.name.clone(),
                    message,
                });
            }
        }
    }

    /// Spawn a panic-guarded task tracked by this node
    pub fn spawn_guarded<F>(self: &Arc<Self>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(self.guard(fut));
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Node with one input and one output channel
///
/// Frontend, backend and process nodes are built on top of it.
pub struct SimpleNode {
    base: Arc<BaseNode>,
    input: Mutex<Option<PayloadReceiver>>,
    output: Mutex<Option<PayloadSender>>,
    output_rx: Mutex<Option<PayloadReceiver>>,
    channel_size: usize,
}

impl SimpleNode {
    /// Node with an output channel
    pub fn new(name: impl Into<String>, token: CancellationToken, channel_size: usize) -> Self {
        let node = Self::without_output(name, token, channel_size);
        node.ensure_output();
        node
    }

    /// Node whose output is created on first `connect_to`
    pub fn without_output(
        name: impl Into<String>,
        token: CancellationToken,
        channel_size: usize,
    ) -> Self {
        Self {
            base: Arc::new(BaseNode::new(name, token)),
            input: Mutex::new(None),
            output: Mutex::new(None),
            output_rx: Mutex::new(None),
            channel_size,
        }
    }

    pub fn base(&self) -> &Arc<BaseNode> {
        &self.base
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn input(&self) -> Option<PayloadReceiver> {
        self.input.lock().clone()
    }

    /// Sender for node tasks, `None` once closed
    pub fn output_sender(&self) -> Option<PayloadSender> {
        self.output.lock().clone()
    }

    /// Hand the node's own sender to its tasks
    ///
    /// The output then closes as soon as the last task holding it exits,
    /// which lets completion cascade downstream without waiting for `wait`.
    pub fn take_output_sender(&self) -> Option<PayloadSender> {
        self.output.lock().take()
    }

    pub fn output(&self) -> Option<PayloadReceiver> {
        self.output_rx.lock().clone()
    }

    /// Output receiver, creating the channel if needed
    pub fn ensure_output(&self) -> PayloadReceiver {
        let mut rx = self.output_rx.lock();
        if let Some(rx) = rx.as_ref() {
            return rx.clone();
        }
        let (tx, new_rx) = payload_channel(self.channel_size);
        *self.output.lock() = Some(tx);
        *rx = Some(new_rx.clone());
        new_rx
    }

    pub fn start(&self, kill: KillSender) {
        self.base.start(kill);
    }

    pub fn stop(&self) -> Result<()> {
        self.base.stop()
    }

    pub fn connect_from(&self, input: PayloadReceiver) -> Result<()> {
        let mut slot = self.input.lock();
        if slot.is_some() {
            return Err(PipelineError::AlreadyConnected(self.name().to_string()));
        }
        *slot = Some(input);
        Ok(())
    }

    pub fn connect_to(&self, node: &NodeRef) -> Result<()> {
        node.connect_from(self.ensure_output())
    }

    /// Wait for the node while discarding whatever is left on the output,
    /// then close the output
    pub async fn wait(&self) -> Result<()> {
        let Some(rx) = self.output() else {
            self.base.wait().await;
            return Ok(());
        };

        let wait = self.base.wait();
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                item = rx.recv() => match item {
                    Ok(payload) => {
                        tracing::warn!(
                            node = %self.name(),
                            sn = payload.sn(),
                            "dropping payload left on output of stopped node"
                        );
                    }
                    Err(_) => {
                        (&mut wait).await;
                        break;
                    }
                },
            }
        }

        self.close_output();
        Ok(())
    }

    /// Drop the node's own sender; the channel closes with the last task
    pub fn close_output(&self) {
        if self.output.lock().take().is_some() {
            tracing::debug!(node = %self.name(), "output closed");
        }
    }
}
