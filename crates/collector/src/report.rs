//! Periodic metrics report
//!
//! Logs the counters published on the [`MetricsBoard`] at a fixed interval.
//!
//! # Example Output
//!
//! ```text
//! [metrics] bulk:stdout:cpu: handled 1,200 (+200) | ok 1,200 | fail 0 | flushes 12 | dropped 0
//! [metrics] total: handled 1,200 (+200) | ok 1,200 | fail 0 | flushes 12 | dropped 0
//! ```

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use transfer_config::{MetricsConfig, MetricsFormat};
use transfer_pipeline::{MetricsBoard, MetricsSnapshot};

/// Reports board snapshots until cancelled
pub struct MetricsReporter {
    config: MetricsConfig,
    board: Arc<MetricsBoard>,
    previous: HashMap<String, MetricsSnapshot>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    component: &'a str,
    #[serde(flatten)]
    snapshot: &'a MetricsSnapshot,
}

impl MetricsReporter {
    pub fn new(config: MetricsConfig, board: Arc<MetricsBoard>) -> Self {
        Self {
            config,
            board,
            previous: HashMap::new(),
        }
    }

    /// Run until cancellation
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.config.enabled || self.config.interval.is_zero() {
            tracing::info!("metrics reporting disabled");
            return;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        tracing::info!(
            interval = ?self.config.interval,
            format = ?self.config.format,
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for line in self.report() {
                        tracing::info!("{line}");
                    }
                }
            }
        }
        for line in self.report() {
            tracing::info!("{line}");
        }
        tracing::info!("metrics reporter shutting down");
    }

    /// One line per component plus a total, empty when nothing is registered
    pub fn report(&mut self) -> Vec<String> {
        let snapshots = self.board.snapshots();
        if snapshots.is_empty() {
            return Vec::new();
        }

        let mut lines = Vec::with_capacity(snapshots.len() + 1);
        for (name, snapshot) in &snapshots {
            lines.push(self.format(name, snapshot));
        }
        let total = self.board.total();
        lines.push(self.format("total", &total));
        lines
    }

    fn format(&mut self, name: &str, snapshot: &MetricsSnapshot) -> String {
        let delta = self
            .previous
            .insert(name.to_string(), *snapshot)
            .map_or(*snapshot, |previous| snapshot.diff(&previous));

        match self.config.format {
            MetricsFormat::Human => human(name, snapshot, &delta),
            MetricsFormat::Json => serde_json::to_string(&JsonLine {
                component: name,
                snapshot,
            })
            .unwrap_or_default(),
        }
    }
}

fn human(name: &str, snapshot: &MetricsSnapshot, delta: &MetricsSnapshot) -> String {
    let mut line = format!(
        "[metrics] {name}: handled {} (+{}) | ok {} | fail {}",
        format_count(snapshot.handled),
        format_count(delta.handled),
        format_count(snapshot.successes),
        format_count(snapshot.fails),
    );
    if snapshot.flushes > 0 || snapshot.dropped_batches > 0 {
        let _ = write!(
            line,
            " | flushes {} | dropped {}",
            format_count(snapshot.flushes),
            format_count(snapshot.dropped_batches),
        );
    }
    if let Some(delay) = snapshot.avg_recv_delay() {
        let _ = write!(line, " | delay {delay:?}");
    }
    line
}

/// Group thousands with commas
fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
