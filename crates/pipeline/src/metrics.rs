//! Processing metrics
//!
//! Atomic counters kept by bulk adapters and processors. All operations use
//! relaxed ordering; values are eventually consistent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Counters of one component
///
/// # Thread Safety
///
/// All methods are safe to call from multiple tasks concurrently.
#[derive(Debug, Default)]
pub struct ProcessorMetrics {
    /// Payloads handed to the component
    handled: AtomicU64,

    /// Records accepted for output
    successes: AtomicU64,

    /// Records rejected or lost
    fails: AtomicU64,

    /// Batches written
    flushes: AtomicU64,

    /// Records written by successful flushes
    flushed_records: AtomicU64,

    /// Failed flush attempts that were retried
    flush_retries: AtomicU64,

    /// Batches given up after the last retry
    dropped_batches: AtomicU64,

    /// Sum of receive-to-process delays in microseconds
    recv_delay_us: AtomicU64,
}

impl ProcessorMetrics {
    pub const fn new() -> Self {
        Self {
            handled: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            fails: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            flushed_records: AtomicU64::new(0),
            flush_retries: AtomicU64::new(0),
            dropped_batches: AtomicU64::new(0),
            recv_delay_us: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fails(&self, count: u64) {
        self.fails.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a successful flush of `records` records
    #[inline]
    pub fn record_flush(&self, records: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.flushed_records.fetch_add(records, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush_retry(&self) {
        self.flush_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch dropped after exhausting retries
    ///
    /// Every record of the batch counts as failed.
    #[inline]
    pub fn record_dropped_batch(&self, records: u64) {
        self.dropped_batches.fetch_add(1, Ordering::Relaxed);
        self.record_fails(records);
    }

    /// Record the delay between a record's timestamp and its processing
    #[inline]
    pub fn record_recv_delay(&self, delay: Duration) {
        self.recv_delay_us
            .fetch_add(delay.as_micros() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fails(&self) -> u64 {
        self.fails.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            handled: self.handled.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            fails: self.fails.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flushed_records: self.flushed_records.load(Ordering::Relaxed),
            flush_retries: self.flush_retries.load(Ordering::Relaxed),
            dropped_batches: self.dropped_batches.load(Ordering::Relaxed),
            recv_delay_us: self.recv_delay_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`ProcessorMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub handled: u64,
    pub successes: u64,
    pub fails: u64,
    pub flushes: u64,
    pub flushed_records: u64,
    pub flush_retries: u64,
    pub dropped_batches: u64,
    pub recv_delay_us: u64,
}

impl MetricsSnapshot {
    /// Average receive delay, `None` before the first success
    pub fn avg_recv_delay(&self) -> Option<Duration> {
        (self.successes > 0).then(|| Duration::from_micros(self.recv_delay_us / self.successes))
    }

    /// Difference from an earlier snapshot
    pub fn diff(&self, previous: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            handled: self.handled.saturating_sub(previous.handled),
            successes: self.successes.saturating_sub(previous.successes),
            fails: self.fails.saturating_sub(previous.fails),
            flushes: self.flushes.saturating_sub(previous.flushes),
            flushed_records: self.flushed_records.saturating_sub(previous.flushed_records),
            flush_retries: self.flush_retries.saturating_sub(previous.flush_retries),
            dropped_batches: self.dropped_batches.saturating_sub(previous.dropped_batches),
            recv_delay_us: self.recv_delay_us.saturating_sub(previous.recv_delay_us),
        }
    }
}

/// Named counters published by the components of running pipelines
///
/// Components register their [`ProcessorMetrics`] while being built; a
/// reporter reads snapshots periodically.
#[derive(Debug, Default)]
pub struct MetricsBoard {
    entries: Mutex<Vec<(String, Arc<ProcessorMetrics>)>>,
}

impl MetricsBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, metrics: Arc<ProcessorMetrics>) {
        self.entries.lock().push((name.into(), metrics));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of every registered component, in registration order
    pub fn snapshots(&self) -> Vec<(String, MetricsSnapshot)> {
        self.entries
            .lock()
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
            .collect()
    }

    /// Sum of every registered component
    pub fn total(&self) -> MetricsSnapshot {
        self.snapshots()
            .iter()
            .fold(MetricsSnapshot::default(), |acc, (_, s)| MetricsSnapshot {
                handled: acc.handled + s.handled,
                successes: acc.successes + s.successes,
                fails: acc.fails + s.fails,
                flushes: acc.flushes + s.flushes,
                flushed_records: acc.flushed_records + s.flushed_records,
                flush_retries: acc.flush_retries + s.flush_retries,
                dropped_batches: acc.dropped_batches + s.dropped_batches,
                recv_delay_us: acc.recv_delay_us + s.recv_delay_us,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_totals() {
        let board = MetricsBoard::new();
        let a = Arc::new(ProcessorMetrics::new());
        let b = Arc::new(ProcessorMetrics::new());
        board.register("bulk:a", Arc::clone(&a));
        board.register("bulk:b", Arc::clone(&b));

        a.record_handled();
        b.record_handled();
        b.record_flush(5);

        let names: Vec<String> = board.snapshots().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["bulk:a", "bulk:b"]);
        let total = board.total();
        assert_eq!(total.handled, 2);
        assert_eq!(total.flushed_records, 5);
    }

    #[test]
    fn test_snapshot_and_diff() {
        let metrics = ProcessorMetrics::new();
        metrics.record_handled();
        metrics.record_handled();
        metrics.record_success();
        metrics.record_recv_delay(Duration::from_millis(4));
        let first = metrics.snapshot();

        metrics.record_flush(1);
        metrics.record_flush_retry();
        metrics.record_dropped_batch(3);
        let second = metrics.snapshot();

        assert_eq!(first.handled, 2);
        assert_eq!(first.avg_recv_delay(), Some(Duration::from_millis(4)));

        let delta = second.diff(&first);
        assert_eq!(delta.handled, 0);
        assert_eq!(delta.flushes, 1);
        assert_eq!(delta.flushed_records, 1);
        assert_eq!(delta.flush_retries, 1);
        assert_eq!(delta.dropped_batches, 1);
        assert_eq!(delta.fails, 3);
    }

    #[test]
    fn test_avg_recv_delay_empty() {
        assert_eq!(MetricsSnapshot::default().avg_recv_delay(), None);
    }
}
