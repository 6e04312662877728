//! TCP frontend - newline-delimited JSON over TCP
//!
//! Listens on the configured address and reads one record per line from
//! every accepted connection. The frontend never finishes on its own; it
//! runs until the pipeline is stopped or the frontend is closed.
//!
//! # Protocol
//!
//! ```text
//! {"time": 1700000000, "dimensions": {...}, "metrics": {...}}\n
//! {"time": 1700000001, "dimensions": {...}, "metrics": {...}}\n
//! ```
//!
//! # Design
//!
//! - **Zero-copy framing**: lines are split off a `bytes::BytesMut` read
//!   buffer and become payload bodies without copying
//! - **Per-connection tasks**: each connection runs in its own task, owned
//!   by the pull so that they all end when the pull is dropped
//! - **Ordering**: payloads of one connection keep their order
//!
//! # Configuration
//!
//! ```toml
//! [pipelines.mq_config]
//! cluster_type = "tcp"
//! cluster_config = { address = "0.0.0.0", port = 50000 }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use transfer_config::Options;
use transfer_pipeline::{BuildScope, Frontend, KillSender, PayloadSender, Result};

use crate::common::{
    DEFAULT_BUFFER_SIZE, DEFAULT_MAX_LINE_SIZE, LineDecoder, SourceError, SourceMetrics,
    forward_lines, report,
};

/// Default listen port
const DEFAULT_PORT: u16 = 50000;

/// TCP frontend configuration
#[derive(Debug, Clone)]
pub struct TcpFrontendConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub address: String,

    /// Listen port, 0 picks a free one
    pub port: u16,

    /// Read buffer size per connection
    pub buffer_size: usize,

    /// Longest accepted line
    pub max_line_size: usize,

    /// TCP nodelay (disable Nagle's algorithm)
    pub nodelay: bool,
}

impl Default for TcpFrontendConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            nodelay: true,
        }
    }
}

impl TcpFrontendConfig {
    /// Create config with custom port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Read from `cluster_config`
    pub fn from_options(options: &Options) -> Result<Self> {
        let defaults = Self::default();
        let port = options.usize_or("port", usize::from(defaults.port))?;
        let port = u16::try_from(port).map_err(|_| {
            transfer_pipeline::PipelineError::build(format!("tcp port {port} out of range"))
        })?;
        Ok(Self {
            address: options.str_or("address", &defaults.address)?,
            port,
            buffer_size: options.usize_or("buffer_size", defaults.buffer_size)?,
            max_line_size: options.usize_or("max_line_size", defaults.max_line_size)?,
            nodelay: options.bool_or("nodelay", defaults.nodelay)?,
        })
    }
}

/// State shared with connection tasks
struct Shared {
    config: TcpFrontendConfig,
    decoder: LineDecoder,
    metrics: Arc<SourceMetrics>,
}

/// Frontend accepting newline-delimited records over TCP
pub struct TcpFrontend {
    shared: Arc<Shared>,
    local_addr: Mutex<Option<SocketAddr>>,
    token: CancellationToken,
}

impl TcpFrontend {
    pub fn new(config: TcpFrontendConfig, decoder: LineDecoder) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                decoder,
                metrics: Arc::new(SourceMetrics::new()),
            }),
            local_addr: Mutex::new(None),
            token: CancellationToken::new(),
        }
    }

    /// Frontend for the scope's `mq_config`
    pub fn from_scope(scope: &BuildScope) -> Result<Self> {
        let config = match scope.shipper() {
            Some(mq) => TcpFrontendConfig::from_options(&mq.cluster_config)?,
            None => TcpFrontendConfig::default(),
        };
        let decoder = LineDecoder::from_options(&scope.pipeline().option)?;
        Ok(Self::new(config, decoder))
    }

    pub fn config(&self) -> &TcpFrontendConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.shared.metrics
    }

    /// Address actually bound, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    async fn serve(&self, output: &PayloadSender) -> std::result::Result<(), SourceError> {
        let bind_addr = self.shared.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SourceError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;
        let local = listener.local_addr()?;
        *self.local_addr.lock() = Some(local);
        tracing::info!(frontend = %self, address = %local, "tcp frontend listening");

        // aborted on drop, which ends every connection with the pull
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        self.shared.metrics.connection_opened();
                        let shared = Arc::clone(&self.shared);
                        let output = output.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(&shared, stream, &output).await {
                                tracing::debug!(peer = %peer, error = %e, "connection error");
                            }
                            shared.metrics.connection_closed();
                        });
                    }
                    Err(e) => {
                        // transient accept errors
                        tracing::warn!(error = %e, "accept error");
                        self.shared.metrics.error();
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!(frontend = %self, "tcp frontend stopped");
        Ok(())
    }
}

/// Read one connection until EOF
async fn handle_connection(
    shared: &Shared,
    stream: TcpStream,
    output: &PayloadSender,
) -> std::result::Result<(), SourceError> {
    stream.set_nodelay(shared.config.nodelay)?;
    let result = forward_lines(
        stream,
        shared.config.buffer_size,
        shared.config.max_line_size,
        &shared.decoder,
        &shared.metrics,
        output,
    )
    .await;
    if result.is_err() {
        shared.metrics.error();
    }
    result
}

#[async_trait]
impl Frontend for TcpFrontend {
    async fn pull(&self, output: &PayloadSender, kill: &KillSender) {
        if let Err(e) = self.serve(output).await {
            report(kill, &self.to_string(), &e).await;
        }
    }

    async fn close(&self) -> Result<()> {
        self.token.cancel();
        Ok(())
    }
}

impl fmt::Display for TcpFrontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp:{}", self.shared.config.port)
    }
}

#[cfg(test)]
#[path = "tcp_test.rs"]
mod tests;
