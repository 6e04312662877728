//! Bulk backend adapter
//!
//! Turns a [`BulkHandler`] (format one payload, write a batch) into a
//! [`Backend`]. Results are buffered and written in batches when the
//! buffer is full or the flush interval elapses.
//!
//! ```text
//! push ──→ [handle task] ──→ result channel ──→ run loop ──→ buffer
//!           push permits                          │  full / tick / close
//!                                                 ▼
//!                                           [flush task] ──→ handler.flush
//!                                            flush permits   retries, then drop
//! ```
//!
//! # Close
//!
//! 1. stop accepting pushes
//! 2. wait for in-flight handle tasks
//! 3. close the result channel
//! 4. wait for the run loop to flush the remainder and for every flush
//! 5. close the handler
//!
//! Every payload accepted before close reaches a flush or is counted as
//! failed. A panic in `handle` or `flush` is counted the same way and
//! reported on the kill channel.

mod semaphore;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use transfer_config::{BulkConfig, RecordFields};
use transfer_protocol::Payload;

use crate::channel::KillSender;
use crate::error::{PipelineError, Result};
use crate::metrics::ProcessorMetrics;
use crate::node::panic_message;
use crate::scope::BuildScope;
use crate::traits::Backend;

pub use semaphore::{ChainedPermit, ChainingSemaphore, global_flush_semaphore, global_push_semaphore};

/// Flushed batches kept for reuse
const MAX_POOLED_BATCHES: usize = 4;

/// Formats and writes records for one kind of sink
#[async_trait]
pub trait BulkHandler: Send + Sync + fmt::Display + 'static {
    /// Formatted record buffered between handle and flush
    type Item: Send + Sync + 'static;

    /// Format one payload
    ///
    /// Returns the record and the time it was produced, or `None` to drop
    /// the payload. Faults worth stopping the pipeline go to `kill`.
    async fn handle(
        &self,
        payload: &Payload,
        kill: &KillSender,
        cancel: &CancellationToken,
    ) -> Option<(Self::Item, DateTime<Utc>)>;

    /// Write a batch, returning the number of records written
    async fn flush(&self, items: &[Self::Item], cancel: &CancellationToken) -> Result<usize>;

    async fn close(&self) -> Result<()>;

    fn set_record_fields(&self, _fields: RecordFields) {}
}

/// State shared with the run loop and flush tasks
struct Shared<H: BulkHandler> {
    name: String,
    handler: Arc<H>,
    config: BulkConfig,
    metrics: Arc<ProcessorMetrics>,
    flush_sem: ChainingSemaphore,
    token: CancellationToken,
    flush_tracker: TaskTracker,
    /// Kill channel of the last push, used by flush tasks
    kill: Mutex<Option<KillSender>>,
    pool: Mutex<Vec<Vec<H::Item>>>,
}

impl<H: BulkHandler> Shared<H> {
    /// Empty batch, reused from the pool when one is available
    fn take_batch(&self) -> Vec<H::Item> {
        self.pool
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.config.buffer_size.max(1)))
    }

    fn recycle(&self, mut batch: Vec<H::Item>) {
        batch.clear();
        let mut pool = self.pool.lock();
        if pool.len() < MAX_POOLED_BATCHES {
            pool.push(batch);
        }
    }

    /// Log a panic of a handle or flush task and raise a kill
    ///
    /// The kill is dropped when the channel is full or closed.
    fn report_panic(&self, stage: &str, message: String, kill: Option<KillSender>) {
        tracing::error!(backend = %self.name, stage, panic = %message, "bulk task panicked");
        let Some(kill) = kill else {
            tracing::warn!(backend = %self.name, "kill channel not set, panic not reported");
            return;
        };
        let err = PipelineError::Panic {
            node: self.name.clone(),
            message,
        };
        if let Err(e) = kill.try_send(err) {
            tracing::warn!(backend = %self.name, error = %e, "kill signal dropped");
        }
    }
}

/// [`Backend`] batching the records of a [`BulkHandler`]
pub struct BulkBackendAdapter<H: BulkHandler> {
    shared: Arc<Shared<H>>,
    push_sem: ChainingSemaphore,
    push_token: CancellationToken,
    push_tracker: TaskTracker,
    result_tx: Mutex<Option<mpsc::Sender<H::Item>>>,
    run_rx: Mutex<Option<mpsc::Receiver<H::Item>>>,
    closed: AtomicBool,
}

impl<H: BulkHandler> BulkBackendAdapter<H> {
    pub fn new(handler: H, config: BulkConfig) -> Self {
        let push_sem = ChainingSemaphore::new(
            config.concurrency,
            global_push_semaphore(config.max_concurrency),
        );
        let flush_sem = ChainingSemaphore::new(
            config.concurrency,
            global_flush_semaphore(config.max_concurrency),
        );
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));

        Self {
            shared: Arc::new(Shared {
                name: format!("bulk:{handler}"),
                handler: Arc::new(handler),
                config,
                metrics: Arc::new(ProcessorMetrics::new()),
                flush_sem,
                token: CancellationToken::new(),
                flush_tracker: TaskTracker::new(),
                kill: Mutex::new(None),
                pool: Mutex::new(Vec::new()),
            }),
            push_sem,
            push_token: CancellationToken::new(),
            push_tracker: TaskTracker::new(),
            result_tx: Mutex::new(Some(tx)),
            run_rx: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
        }
    }

    /// Adapter configured from the global bulk settings and the scope's
    /// shipper overrides
    ///
    /// Its counters are published on the scope's metrics board, if any.
    pub fn from_scope(scope: &BuildScope, handler: H) -> Self {
        let defaults = &scope.global().bulk;
        let config = match scope.shipper() {
            Some(shipper) => shipper.bulk_config(defaults),
            None => defaults.clone(),
        };
        let adapter = Self::new(handler, config);
        if let Some(board) = scope.metrics_board() {
            board.register(adapter.shared.name.clone(), Arc::clone(adapter.metrics()));
        }
        adapter
    }

    /// Share counters with the caller, e.g. for periodic reporting
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ProcessorMetrics>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.metrics = metrics;
        }
        self
    }

    pub fn metrics(&self) -> &Arc<ProcessorMetrics> {
        &self.shared.metrics
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.shared.handler
    }

    pub fn config(&self) -> &BulkConfig {
        &self.shared.config
    }

    /// Sender for handle tasks, starting the run loop on first use
    fn ensure_started(&self) -> Option<mpsc::Sender<H::Item>> {
        let tx = self.result_tx.lock().clone()?;
        if let Some(rx) = self.run_rx.lock().take() {
            let shared = Arc::clone(&self.shared);
            self.shared.flush_tracker.spawn(run(shared, rx));
            tracing::debug!(backend = %self.shared.name, "bulk run loop started");
        }
        Some(tx)
    }
}

/// Buffer results and flush on size, tick and shutdown
async fn run<H: BulkHandler>(shared: Arc<Shared<H>>, mut rx: mpsc::Receiver<H::Item>) {
    let buffer_size = shared.config.buffer_size.max(1);
    let interval = shared.config.flush_interval.max(Duration::from_millis(1));
    let mut buffer = shared.take_batch();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            item = rx.recv() => match item {
                Some(item) => {
                    buffer.push(item);
                    if buffer.len() >= buffer_size {
                        flush(&shared, &mut buffer).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(&shared, &mut buffer).await;
                }
            }
            _ = shared.token.cancelled() => {
                rx.close();
                while let Some(item) = rx.recv().await {
                    buffer.push(item);
                    if buffer.len() >= buffer_size {
                        flush(&shared, &mut buffer).await;
                    }
                }
                break;
            }
        }
    }

    if !buffer.is_empty() {
        flush(&shared, &mut buffer).await;
    }
    tracing::debug!(backend = %shared.name, "bulk run loop finished");
}

/// Detach the buffer and write it from a flush task
async fn flush<H: BulkHandler>(shared: &Arc<Shared<H>>, buffer: &mut Vec<H::Item>) {
    let batch = std::mem::replace(buffer, shared.take_batch());
    let Some(permit) = shared.flush_sem.acquire().await else {
        tracing::error!(backend = %shared.name, records = batch.len(), "flush semaphore closed, batch dropped");
        shared.metrics.record_dropped_batch(batch.len() as u64);
        return;
    };

    let task_shared = Arc::clone(shared);
    shared.flush_tracker.spawn(async move {
        let _permit = permit;
        let flushed = AssertUnwindSafe(flush_with_retries(&task_shared, &batch))
            .catch_unwind()
            .await;
        if let Err(panic) = flushed {
            task_shared.metrics.record_dropped_batch(batch.len() as u64);
            let kill = task_shared.kill.lock().clone();
            task_shared.report_panic("flush", panic_message(panic.as_ref()), kill);
        }
        task_shared.recycle(batch);
    });
}

/// Write `batch`, retrying `flush_retries` times before dropping it
async fn flush_with_retries<H: BulkHandler>(shared: &Shared<H>, batch: &[H::Item]) {
    let retries = shared.config.flush_retries;
    let delay = shared.config.flush_interval / u32::try_from(retries.max(1)).unwrap_or(u32::MAX);

    for attempt in 0..=retries {
        match shared.handler.flush(batch, &shared.token).await {
            Ok(count) => {
                shared.metrics.record_flush(count as u64);
                tracing::debug!(backend = %shared.name, records = count, "batch flushed");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    backend = %shared.name,
                    attempt,
                    retries,
                    error = %e,
                    "flush failed"
                );
                if attempt == retries {
                    break;
                }
                shared.metrics.record_flush_retry();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shared.token.cancelled() => break,
                }
            }
        }
    }

    tracing::error!(backend = %shared.name, records = batch.len(), "batch dropped after retries");
    shared.metrics.record_dropped_batch(batch.len() as u64);
}

/// Format one payload and queue the record for the run loop
async fn handle_one<H: BulkHandler>(
    shared: &Shared<H>,
    payload: &Payload,
    kill: &KillSender,
    tx: &mpsc::Sender<H::Item>,
) {
    let Some((item, at)) = shared.handler.handle(payload, kill, &shared.token).await else {
        shared.metrics.record_fails(1);
        return;
    };
    shared
        .metrics
        .record_recv_delay((Utc::now() - at).to_std().unwrap_or_default());
    if tx.send(item).await.is_ok() {
        shared.metrics.record_success();
    } else {
        tracing::warn!(backend = %shared.name, "result channel closed, record dropped");
        shared.metrics.record_fails(1);
    }
}

#[async_trait]
impl<H: BulkHandler> Backend for BulkBackendAdapter<H> {
    async fn push(&self, payload: Payload, kill: &KillSender) {
        let shared = &self.shared;
        if self.push_token.is_cancelled() {
            tracing::warn!(backend = %shared.name, sn = payload.sn(), "push after close, payload dropped");
            shared.metrics.record_fails(1);
            return;
        }
        let Some(tx) = self.ensure_started() else {
            shared.metrics.record_fails(1);
            return;
        };

        let permit = tokio::select! {
            permit = self.push_sem.acquire() => permit,
            _ = self.push_token.cancelled() => None,
        };
        let Some(permit) = permit else {
            tracing::warn!(backend = %shared.name, sn = payload.sn(), "push cancelled, payload dropped");
            shared.metrics.record_fails(1);
            return;
        };

        shared.metrics.record_handled();
        {
            let mut slot = shared.kill.lock();
            if slot.is_none() {
                *slot = Some(kill.clone());
            }
        }
        let shared = Arc::clone(shared);
        let kill = kill.clone();
        self.push_tracker.spawn(async move {
            let _permit = permit;
            let handled = AssertUnwindSafe(handle_one(&shared, &payload, &kill, &tx))
                .catch_unwind()
                .await;
            if let Err(panic) = handled {
                shared.metrics.record_fails(1);
                shared.report_panic("handle", panic_message(panic.as_ref()), Some(kill));
            }
        });
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let shared = &self.shared;
        tracing::info!(backend = %shared.name, "closing bulk backend");

        self.push_token.cancel();
        self.push_tracker.close();
        self.push_tracker.wait().await;

        self.result_tx.lock().take();
        self.run_rx.lock().take();
        shared.flush_tracker.close();
        shared.flush_tracker.wait().await;
        shared.kill.lock().take();

        shared.token.cancel();
        let result = shared.handler.close().await;
        let snapshot = shared.metrics.snapshot();
        tracing::info!(
            backend = %shared.name,
            handled = snapshot.handled,
            flushed = snapshot.flushed_records,
            fails = snapshot.fails,
            dropped_batches = snapshot.dropped_batches,
            "bulk backend closed"
        );
        result
    }

    fn set_record_fields(&self, fields: RecordFields) {
        self.shared.handler.set_record_fields(fields);
    }
}

impl<H: BulkHandler> fmt::Display for BulkBackendAdapter<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shared.name)
    }
}

#[cfg(test)]
#[path = "bulk_test.rs"]
mod tests;
