//! Stdout backend - JSON lines on standard output
//!
//! Writes one JSON document per record, batched by the bulk adapter.
//! Meant for debugging pipelines, not for production throughput.
//!
//! # Example Output
//!
//! ```text
//! cpu_summary	{"dimensions":{"host":"a"},"metrics":{"usage":0.5},"time":1700000000}
//! cpu_summary	{"dimensions":{"host":"b"},"metrics":{"usage":0.7},"time":1700000000}
//! ```
//!
//! The table prefix is printed when `storage_config.show_table` is set.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use transfer_config::{Options, RecordFields};
use transfer_pipeline::{BuildScope, BulkHandler, CancellationToken, KillSender, Result};
use transfer_protocol::Payload;

use crate::common::{Projection, SinkError, SinkMetrics, table_name};

/// Configuration for stdout backend
#[derive(Debug, Clone, Default)]
pub struct StdoutConfig {
    /// Prefix every line with the result table name
    pub show_table: bool,
}

impl StdoutConfig {
    /// Read from `storage_config`
    pub fn from_options(options: &Options) -> Result<Self> {
        Ok(Self {
            show_table: options.bool_or("show_table", false)?,
        })
    }
}

/// Bulk handler printing JSON lines
pub struct StdoutHandler<W = Stdout> {
    name: String,
    table: String,
    config: StdoutConfig,
    projection: Projection,
    writer: Mutex<W>,
    metrics: Arc<SinkMetrics>,
}

impl StdoutHandler<Stdout> {
    pub fn new(table: impl Into<String>, config: StdoutConfig) -> Self {
        Self::with_writer(table, config, tokio::io::stdout())
    }

    /// Handler for the scope's result table and shipper
    pub fn from_scope(scope: &BuildScope) -> Result<Self> {
        let config = match scope.shipper() {
            Some(shipper) => StdoutConfig::from_options(&shipper.storage_config)?,
            None => StdoutConfig::default(),
        };
        Ok(Self::new(table_name(scope), config))
    }
}

impl<W> StdoutHandler<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Handler writing to any async writer
    pub fn with_writer(table: impl Into<String>, config: StdoutConfig, writer: W) -> Self {
        let table = table.into();
        let name = if table.is_empty() {
            "stdout".to_string()
        } else {
            format!("stdout:{table}")
        };
        Self {
            name,
            table,
            config,
            projection: Projection::default(),
            writer: Mutex::new(writer),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    async fn write(&self, items: &[String]) -> std::result::Result<usize, SinkError> {
        let mut buf = String::with_capacity(items.iter().map(|l| l.len() + 1).sum());
        for line in items {
            buf.push_str(line);
            buf.push('\n');
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(buf.as_bytes()).await?;
        writer.flush().await?;
        self.metrics.batch_written(items.len() as u64, buf.len() as u64);
        Ok(items.len())
    }
}

#[async_trait]
impl<W> BulkHandler for StdoutHandler<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Item = String;

    async fn handle(
        &self,
        payload: &Payload,
        _kill: &KillSender,
        _cancel: &CancellationToken,
    ) -> Option<(String, DateTime<Utc>)> {
        let line = match self.projection.line(payload) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(backend = %self.name, sn = payload.sn(), error = %e, "payload skipped");
                return None;
            }
        };
        let line = if self.config.show_table {
            format!("{}\t{line}", self.table)
        } else {
            line
        };
        Some((line, payload.time()))
    }

    async fn flush(&self, items: &[String], _cancel: &CancellationToken) -> Result<usize> {
        self.write(items).await.map_err(|e| {
            self.metrics.write_error();
            e.into_flush()
        })
    }

    async fn close(&self) -> Result<()> {
        self.writer
            .lock()
            .await
            .flush()
            .await
            .map_err(|e| SinkError::Io(e).into_flush())
    }

    fn set_record_fields(&self, fields: RecordFields) {
        self.projection.set(fields);
    }
}

impl<W> fmt::Display for StdoutHandler<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
#[path = "stdout_test.rs"]
mod stdout_test;
