//! Backend node - feeds a data sink from `multi_num` workers

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::task::TaskTracker;

use crate::channel::{KillSender, PayloadReceiver, send_or_cancel};
use crate::error::Result;
use crate::node::{Node, NodeRef, SimpleNode};
use crate::scope::BuildScope;
use crate::traits::Backend;

/// Node wrapping a [`Backend`]
///
/// # Design
///
/// - `workers` tasks read the same input channel concurrently
/// - when a successor is attached, each payload is forwarded after push
/// - the backend is closed once every worker has exited, so no push can
///   follow close
pub struct BackendNode {
    inner: SimpleNode,
    backend: Arc<dyn Backend>,
    workers: usize,
}

impl BackendNode {
    /// Worker count comes from the scope's result table
    pub fn new(scope: &BuildScope, backend: Box<dyn Backend>) -> Self {
        let name = format!("$:{backend}");
        Self {
            inner: SimpleNode::without_output(name, scope.child_token(), scope.channel_size()),
            backend: Arc::from(backend),
            workers: scope.multi_num(),
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

#[async_trait]
impl Node for BackendNode {
    fn start(&self, kill: KillSender) {
        self.inner.start(kill.clone());

        let base = Arc::clone(self.inner.base());
        let token = base.token().clone();
        let workers = TaskTracker::new();

        match self.inner.input() {
            Some(input) => {
                let output = self.inner.take_output_sender();
                for worker in 0..self.workers {
                    let input = input.clone();
                    let output = output.clone();
                    let backend = Arc::clone(&self.backend);
                    let kill = kill.clone();
                    let token = token.clone();
                    let name = base.name().to_string();

                    let task = base.guard(async move {
                        loop {
                            let payload = tokio::select! {
                                biased;
                                item = input.recv() => match item {
                                    Ok(payload) => payload,
                                    Err(_) => break,
                                },
                                _ = token.cancelled() => break,
                            };

                            match &output {
                                Some(output) => {
                                    backend.push(payload.clone(), &kill).await;
                                    send_or_cancel(output, payload, &token).await;
                                }
                                None => backend.push(payload, &kill).await,
                            }
                        }
                        tracing::debug!(node = %name, worker, "backend worker finished");
                    });
                    base.tracker().spawn(workers.track_future(task));
                }
            }
            None => {
                tracing::warn!(node = %base.name(), "backend node has no input");
                let token = token.clone();
                base.tracker()
                    .spawn(workers.track_future(async move { token.cancelled().await }));
            }
        }
        workers.close();

        tracing::info!(node = %base.name(), workers = self.workers, "backend node started");

        let backend = Arc::clone(&self.backend);
        let closer_base = Arc::clone(&base);
        base.spawn_guarded(async move {
            workers.wait().await;
            if let Err(e) = backend.close().await {
                tracing::error!(node = %closer_base.name(), error = %e, "close backend failed");
            }
            tracing::info!(node = %closer_base.name(), "backend closed");
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

impl fmt::Display for BackendNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.name())
    }
}
