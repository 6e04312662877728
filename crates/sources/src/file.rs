//! File frontend - JSON lines from a file or stdin
//!
//! Reads the input once from start to end and finishes at EOF, which
//! lets the collector tear the pipeline down after the frontend wait
//! delay.
//!
//! # Configuration
//!
//! ```toml
//! [pipelines.mq_config]
//! cluster_type = "file"
//! cluster_config = { path = "input.jsonl", buffer_size = 65536 }
//! ```
//!
//! A missing `path`, or `"-"`, reads stdin.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use transfer_config::Options;
use transfer_pipeline::{BuildScope, Frontend, KillSender, PayloadSender, Result};

use crate::common::{
    DEFAULT_BUFFER_SIZE, DEFAULT_MAX_LINE_SIZE, LineDecoder, SourceError, SourceMetrics,
    forward_lines, report,
};

/// File frontend configuration
#[derive(Debug, Clone)]
pub struct FileFrontendConfig {
    /// Input path, `None` for stdin
    pub path: Option<PathBuf>,

    /// Read buffer size
    pub buffer_size: usize,

    /// Longest accepted line
    pub max_line_size: usize,
}

impl Default for FileFrontendConfig {
    fn default() -> Self {
        Self {
            path: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_line_size: DEFAULT_MAX_LINE_SIZE,
        }
    }
}

impl FileFrontendConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Read from `cluster_config`
    pub fn from_options(options: &Options) -> Result<Self> {
        let path = options
            .get_str("path")?
            .filter(|p| !p.is_empty() && *p != "-")
            .map(PathBuf::from);
        Ok(Self {
            path,
            buffer_size: options.usize_or("buffer_size", DEFAULT_BUFFER_SIZE)?,
            max_line_size: options.usize_or("max_line_size", DEFAULT_MAX_LINE_SIZE)?,
        })
    }
}

/// Frontend reading newline-delimited records from a file or stdin
pub struct FileFrontend {
    config: FileFrontendConfig,
    decoder: LineDecoder,
    metrics: Arc<SourceMetrics>,
}

impl FileFrontend {
    pub fn new(config: FileFrontendConfig, decoder: LineDecoder) -> Self {
        Self {
            config,
            decoder,
            metrics: Arc::new(SourceMetrics::new()),
        }
    }

    /// Frontend for the scope's `mq_config`
    pub fn from_scope(scope: &BuildScope) -> Result<Self> {
        let config = match scope.shipper() {
            Some(mq) => FileFrontendConfig::from_options(&mq.cluster_config)?,
            None => FileFrontendConfig::default(),
        };
        let decoder = LineDecoder::from_options(&scope.pipeline().option)?;
        Ok(Self::new(config, decoder))
    }

    pub fn config(&self) -> &FileFrontendConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    async fn read(&self, output: &PayloadSender) -> std::result::Result<(), SourceError> {
        let config = &self.config;
        match &config.path {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| SourceError::Open {
                        target: path.display().to_string(),
                        source: e,
                    })?;
                forward_lines(
                    file,
                    config.buffer_size,
                    config.max_line_size,
                    &self.decoder,
                    &self.metrics,
                    output,
                )
                .await
            }
            None => {
                forward_lines(
                    tokio::io::stdin(),
                    config.buffer_size,
                    config.max_line_size,
                    &self.decoder,
                    &self.metrics,
                    output,
                )
                .await
            }
        }
    }
}

#[async_trait]
impl Frontend for FileFrontend {
    async fn pull(&self, output: &PayloadSender, kill: &KillSender) {
        tracing::info!(frontend = %self, "file frontend reading");
        match self.read(output).await {
            Ok(()) => {}
            Err(SourceError::ChannelClosed) => {
                tracing::debug!(frontend = %self, "output closed, reading stopped");
            }
            Err(e) => report(kill, &self.to_string(), &e).await,
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            frontend = %self,
            lines = snapshot.lines_received,
            sent = snapshot.payloads_sent,
            malformed = snapshot.malformed,
            "file frontend reached end of input"
        );
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl fmt::Display for FileFrontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.config.path {
            Some(path) => write!(f, "file:{}", path.display()),
            None => f.write_str("stdin"),
        }
    }
}

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;
