//! Common types and utilities for frontends
//!
//! Shared by the file and TCP frontends: newline framing over any
//! `AsyncRead`, line decoding and counters.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use transfer_config::{Options, keys};
use transfer_pipeline::{KillSender, PayloadSender, PipelineError};
use transfer_protocol::{Payload, PayloadFlag};

/// Default read buffer size (64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default maximum line size (1MB)
pub const DEFAULT_MAX_LINE_SIZE: usize = 1024 * 1024;

/// Frontend errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Failed to open the input
    #[error("failed to open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind to address
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line is not valid for the configured encoding
    #[error("malformed line: {0}")]
    Malformed(String),

    /// Line exceeds the size limit
    #[error("line size {size} exceeds limit {limit}")]
    LineTooLong { size: usize, limit: usize },

    /// Every receiver of the output is gone
    #[error("output channel closed")]
    ChannelClosed,
}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> Self {
        PipelineError::handler("source", e.to_string())
    }
}

/// Line encoding of a frontend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    /// One JSON document per line (default)
    #[default]
    Json,
    /// Lines are passed through untouched
    Raw,
}

/// Turns framed lines into payloads
#[derive(Debug, Clone, Default)]
pub struct LineDecoder {
    pub encoding: Encoding,

    /// Malformed lines stop the frontend instead of being skipped
    pub strict: bool,
}

impl LineDecoder {
    pub fn new(encoding: Encoding, strict: bool) -> Self {
        Self { encoding, strict }
    }

    /// Decoder configured by the pipeline's `encoding` and
    /// `encoding_strict` options
    pub fn from_options(options: &Options) -> Result<Self, PipelineError> {
        let encoding = match options.str_or(keys::ENCODING, "json")?.to_ascii_lowercase().as_str() {
            "json" | "utf8" | "utf-8" => Encoding::Json,
            "raw" => Encoding::Raw,
            other => {
                return Err(PipelineError::build(format!("unsupported encoding '{other}'")));
            }
        };
        let strict = options.bool_or(keys::ENCODING_STRICT, false)?;
        Ok(Self { encoding, strict })
    }

    /// Decode one line, `None` for blank lines
    pub fn decode(&self, line: Bytes) -> Result<Option<Payload>, SourceError> {
        let line = trim(line);
        if line.is_empty() {
            return Ok(None);
        }
        if self.encoding == Encoding::Json
            && let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&line)
        {
            return Err(SourceError::Malformed(e.to_string()));
        }
        Ok(Some(Payload::from_bytes(line, PayloadFlag::NONE)))
    }
}

/// Strip surrounding ASCII whitespace without copying
fn trim(line: Bytes) -> Bytes {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    line.slice(start..end)
}

/// Counters shared by all frontends
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Currently active connections
    pub connections_active: AtomicU64,

    /// Total connections accepted
    pub connections_total: AtomicU64,

    /// Total lines framed
    pub lines_received: AtomicU64,

    /// Total bytes read
    pub bytes_received: AtomicU64,

    /// Payloads handed to the pipeline
    pub payloads_sent: AtomicU64,

    /// Lines rejected by the decoder
    pub malformed: AtomicU64,

    /// Total errors encountered
    pub errors: AtomicU64,
}

impl SourceMetrics {
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            payloads_sent: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn bytes_read(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn payload_sent(&self) {
        self.payloads_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a malformed line, also counted as an error
    #[inline]
    pub fn line_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            payloads_sent: self.payloads_sent.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub lines_received: u64,
    pub bytes_received: u64,
    pub payloads_sent: u64,
    pub malformed: u64,
    pub errors: u64,
}

/// Frame `reader` into lines and send the decoded payloads to `output`
///
/// Returns at EOF; a final line without trailing newline is still
/// emitted. Malformed lines are skipped unless the decoder is strict.
pub(crate) async fn forward_lines<R: AsyncRead + Unpin>(
    mut reader: R,
    buffer_size: usize,
    max_line_size: usize,
    decoder: &LineDecoder,
    metrics: &SourceMetrics,
    output: &PayloadSender,
) -> Result<(), SourceError> {
    let mut buf = BytesMut::with_capacity(buffer_size.max(1));
    // bytes already searched for a newline
    let mut scanned = 0;

    loop {
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            if !buf.is_empty() {
                let line = buf.split().freeze();
                emit(line, decoder, metrics, output).await?;
            }
            return Ok(());
        }
        metrics.bytes_read(n as u64);

        while let Some(pos) = buf[scanned..].iter().position(|b| *b == b'\n') {
            let mut line = buf.split_to(scanned + pos + 1).freeze();
            line.truncate(line.len() - 1);
            scanned = 0;
            emit(line, decoder, metrics, output).await?;
        }
        scanned = buf.len();

        if buf.len() > max_line_size {
            metrics.error();
            return Err(SourceError::LineTooLong {
                size: buf.len(),
                limit: max_line_size,
            });
        }
        if buf.capacity() - buf.len() < buffer_size / 4 {
            buf.reserve(buffer_size);
        }
    }
}

async fn emit(
    line: Bytes,
    decoder: &LineDecoder,
    metrics: &SourceMetrics,
    output: &PayloadSender,
) -> Result<(), SourceError> {
    metrics.line_received();
    match decoder.decode(line) {
        Ok(Some(payload)) => {
            output
                .send(payload)
                .await
                .map_err(|_| SourceError::ChannelClosed)?;
            metrics.payload_sent();
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            metrics.line_malformed();
            if decoder.strict {
                return Err(e);
            }
            tracing::debug!(error = %e, "malformed line skipped");
            Ok(())
        }
    }
}

/// Report a frontend fault on the kill channel
pub(crate) async fn report(kill: &KillSender, component: &str, e: &SourceError) {
    tracing::error!(frontend = %component, error = %e, "frontend failed");
    if kill
        .send(PipelineError::handler(component, e.to_string()))
        .await
        .is_err()
    {
        tracing::debug!(frontend = %component, "kill channel closed");
    }
}
