//! File backend - JSON lines appended to a file
//!
//! Writes one JSON document per record. Batches come from the bulk
//! adapter, which also retries failed writes.
//!
//! # Configuration
//!
//! ```toml
//! [[pipelines.result_table_list.shipper_list]]
//! cluster_type = "file"
//! storage_config = { path = "out/{table}.jsonl" }
//! ```
//!
//! `{table}` in the path is replaced by the result table name. Parent
//! directories are created on first write.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use transfer_config::{Options, RecordFields};
use transfer_pipeline::{
    BuildScope, BulkHandler, CancellationToken, KillSender, PipelineError, Result,
};
use transfer_protocol::Payload;

use crate::common::{Projection, SinkError, SinkMetrics, table_name};

/// Write buffer size (256KB)
const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Configuration for file backend
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Output file
    pub path: PathBuf,

    /// Write buffer size
    pub buffer_size: usize,
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Read from `storage_config`, expanding `{table}`
    pub fn from_options(options: &Options, table: &str) -> Result<Self> {
        let path = options
            .get_str("path")?
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PipelineError::build("file backend needs storage_config.path"))?;
        Ok(Self {
            path: PathBuf::from(path.replace("{table}", table)),
            buffer_size: options.usize_or("buffer_size", DEFAULT_BUFFER_SIZE)?,
        })
    }
}

/// Bulk handler appending JSON lines to a file
pub struct FileHandler {
    config: FileConfig,
    projection: Projection,
    writer: Mutex<Option<BufWriter<File>>>,
    metrics: Arc<SinkMetrics>,
}

impl FileHandler {
    pub fn new(config: FileConfig) -> Self {
        Self {
            config,
            projection: Projection::default(),
            writer: Mutex::new(None),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    /// Handler for the scope's result table and shipper
    pub fn from_scope(scope: &BuildScope) -> Result<Self> {
        let shipper = scope
            .shipper()
            .ok_or_else(|| PipelineError::build("file backend built outside a shipper"))?;
        let config = FileConfig::from_options(&shipper.storage_config, table_name(scope))?;
        Ok(Self::new(config))
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    async fn open(&self) -> std::result::Result<BufWriter<File>, SinkError> {
        if let Some(parent) = self.config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await?;
        tracing::info!(path = %self.config.path.display(), "file backend opened");
        Ok(BufWriter::with_capacity(self.config.buffer_size, file))
    }

    async fn write(&self, items: &[String]) -> std::result::Result<usize, SinkError> {
        let mut guard = self.writer.lock().await;
        let writer = match guard.as_mut() {
            Some(writer) => writer,
            None => guard.insert(self.open().await?),
        };

        let mut bytes = 0;
        for line in items {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            bytes += line.len() + 1;
        }
        writer.flush().await?;
        self.metrics.batch_written(items.len() as u64, bytes as u64);
        Ok(items.len())
    }
}

#[async_trait]
impl BulkHandler for FileHandler {
    type Item = String;

    async fn handle(
        &self,
        payload: &Payload,
        _kill: &KillSender,
        _cancel: &CancellationToken,
    ) -> Option<(String, DateTime<Utc>)> {
        match self.projection.line(payload) {
            Ok(line) => Some((line, payload.time())),
            Err(e) => {
                tracing::warn!(backend = %self, sn = payload.sn(), error = %e, "payload skipped");
                None
            }
        }
    }

    async fn flush(&self, items: &[String], _cancel: &CancellationToken) -> Result<usize> {
        self.write(items).await.map_err(|e| {
            self.metrics.write_error();
            // reopen on the next attempt
            if let Ok(mut guard) = self.writer.try_lock() {
                guard.take();
            }
            e.into_flush()
        })
    }

    async fn close(&self) -> Result<()> {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        writer.flush().await.map_err(|e| SinkError::Io(e).into_flush())?;
        writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| SinkError::Io(e).into_flush())?;
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            path = %self.config.path.display(),
            records = snapshot.records_written,
            bytes = snapshot.bytes_written,
            "file backend closed"
        );
        Ok(())
    }

    fn set_record_fields(&self, fields: RecordFields) {
        self.projection.set(fields);
    }
}

impl fmt::Display for FileHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file:{}", self.config.path.display())
    }
}

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;
