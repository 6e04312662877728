//! Pipeline supervisor
//!
//! Builds every configured pipeline, starts them, watches their kill
//! channels and stops them all once a shutdown is requested or every
//! frontend has finished.
//!
//! ```text
//!  start ──→ [pipeline 1] ──kill──┐
//!        ──→ [pipeline 2] ──kill──┼──→ monitor ──→ all finished? ──┐
//!                                 │                                ├──→ stop(grace) ──→ wait
//!  SIGINT / SIGTERM ──────────────┴────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use transfer_config::{Config, GlobalConfig, PipelineConfig};
use transfer_pipeline::{
    BuildScope, ConfigBuilder, KillReceiver, MetricsBoard, NodeRef, Pipeline, PipelineError,
    Registry,
};

use crate::report::MetricsReporter;

/// Registry with every component shipped in this workspace
pub fn default_registry() -> Registry {
    let mut registry = Registry::with_builtins();
    transfer_sources::register(&mut registry);
    transfer_sinks::register(&mut registry);
    transfer_transform::register(&mut registry);
    registry
}

/// Build one pipeline from its configuration
///
/// The configured processors are chained between the branch start and
/// every backend, once per lane.
pub fn build_pipeline(
    global: Arc<GlobalConfig>,
    config: &PipelineConfig,
    registry: Arc<Registry>,
    board: &Arc<MetricsBoard>,
) -> transfer_pipeline::Result<Pipeline> {
    let scope = BuildScope::new(global, config.clone()).with_metrics_board(Arc::clone(board));
    let builder = ConfigBuilder::new(scope, registry, config.name());
    let processors = &config.processors;

    if config.is_log_cluster()? {
        let mut flat = |b: &mut ConfigBuilder, scope: &BuildScope, from: &NodeRef, to: &NodeRef| {
            splice(b, scope, from, to, processors)
        };
        let mut cluster =
            |b: &mut ConfigBuilder, scope: &BuildScope, from: &NodeRef, to: &NodeRef| {
                splice(b, scope, from, to, processors)
            };
        builder.build_branching_for_log_cluster(None, &mut flat, &mut cluster)
    } else {
        let mut chain = |b: &mut ConfigBuilder, scope: &BuildScope, from: &NodeRef, to: &NodeRef| {
            splice(b, scope, from, to, processors)
        };
        builder.build_branching(None, false, &mut chain)
    }
}

/// `from → processors… → to`
fn splice(
    builder: &mut ConfigBuilder,
    scope: &BuildScope,
    from: &NodeRef,
    to: &NodeRef,
    processors: &[String],
) -> transfer_pipeline::Result<()> {
    let mut previous = Arc::clone(from);
    for node in builder.data_processors(scope, processors)? {
        builder.connect_refs(&previous, &node);
        previous = node;
    }
    builder.connect_refs(&previous, to);
    Ok(())
}

/// Outcome of [`Collector::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Pipelines started
    pub pipelines: usize,

    /// Pipelines whose frontend finished on its own
    pub finished: usize,

    /// Faults reported on kill channels, frontend completions excluded
    pub kills: u64,

    /// Pipelines that failed to stop or wait cleanly
    pub failed: usize,
}

/// Runs every pipeline of a configuration
pub struct Collector {
    config: Config,
    global: Arc<GlobalConfig>,
    registry: Arc<Registry>,
    board: Arc<MetricsBoard>,
}

impl Collector {
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, default_registry())
    }

    pub fn with_registry(config: Config, registry: Registry) -> Self {
        Self {
            global: Arc::new(config.global.clone()),
            config,
            registry: Arc::new(registry),
            board: Arc::new(MetricsBoard::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Counters published by the built components
    pub fn board(&self) -> &Arc<MetricsBoard> {
        &self.board
    }

    /// Build every pipeline without starting it
    ///
    /// A pipeline that fails to build aborts in strict mode and is skipped
    /// otherwise.
    pub fn build(&self) -> Result<Vec<Pipeline>> {
        let mut pipelines = Vec::with_capacity(self.config.pipelines.len());
        for config in &self.config.pipelines {
            let name = config.name();
            match build_pipeline(
                Arc::clone(&self.global),
                config,
                Arc::clone(&self.registry),
                &self.board,
            ) {
                Ok(pipeline) => {
                    tracing::info!(
                        pipeline = %name,
                        nodes = pipeline.nodes().len(),
                        "pipeline built"
                    );
                    pipelines.push(pipeline);
                }
                Err(e) if self.global.strict_mode => {
                    return Err(e).with_context(|| format!("failed to build {name}"));
                }
                Err(e) => {
                    tracing::error!(pipeline = %name, error = %e, "pipeline build failed, skipped");
                }
            }
        }
        Ok(pipelines)
    }

    /// Start every pipeline and run until `shutdown` resolves or every
    /// frontend has finished
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<RunSummary> {
        let pipelines: Vec<Arc<Pipeline>> = self.build()?.into_iter().map(Arc::new).collect();
        let mut summary = RunSummary {
            pipelines: pipelines.len(),
            ..RunSummary::default()
        };
        if pipelines.is_empty() {
            tracing::warn!("no pipeline to run");
            return Ok(summary);
        }

        let cancel = CancellationToken::new();
        let reporter = tokio::spawn(
            MetricsReporter::new(self.config.metrics.clone(), Arc::clone(&self.board))
                .run(cancel.clone()),
        );

        let kills = Arc::new(AtomicU64::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut monitors = JoinSet::new();
        for pipeline in &pipelines {
            let rx = pipeline.start();
            monitors.spawn(monitor(
                pipeline.name().to_string(),
                rx,
                done_tx.clone(),
                Arc::clone(&kills),
                cancel.clone(),
            ));
        }
        drop(done_tx);
        tracing::info!(pipelines = pipelines.len(), "collector running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, stopping pipelines");
                    break;
                }
                finished = done_rx.recv() => {
                    if finished.is_none() {
                        break;
                    }
                    summary.finished += 1;
                    if summary.finished == pipelines.len() {
                        tracing::info!("every pipeline finished, stopping");
                        break;
                    }
                }
            }
        }

        let grace = self.global.stop_timeout;
        let mut stopping = JoinSet::new();
        for pipeline in &pipelines {
            let pipeline = Arc::clone(pipeline);
            stopping.spawn(async move {
                let stopped = pipeline.stop(grace).await;
                let waited = pipeline.wait().await;
                (pipeline.name().to_string(), stopped.and(waited))
            });
        }
        while let Some(joined) = stopping.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => {
                    summary.failed += 1;
                    tracing::warn!(pipeline = %name, error = %e, "pipeline did not stop cleanly");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(error = %e, "pipeline stop task failed");
                }
            }
        }

        cancel.cancel();
        while monitors.join_next().await.is_some() {}
        if let Err(e) = reporter.await {
            tracing::warn!(error = %e, "metrics reporter failed");
        }

        summary.kills = kills.load(Ordering::Relaxed);
        tracing::info!(
            pipelines = summary.pipelines,
            finished = summary.finished,
            kills = summary.kills,
            failed = summary.failed,
            "collector stopped"
        );
        Ok(summary)
    }
}

/// Log the kills of one pipeline, reporting its frontend completion once
async fn monitor(
    name: String,
    mut rx: KillReceiver,
    done: mpsc::UnboundedSender<()>,
    kills: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mut finished = false;
    loop {
        let err = tokio::select! {
            biased;
            err = rx.recv() => err,
            _ = cancel.cancelled() => rx.try_recv().ok(),
        };
        let Some(err) = err else {
            break;
        };
        match err {
            PipelineError::FrontendTimeout(frontend) => {
                if !finished {
                    finished = true;
                    tracing::info!(pipeline = %name, frontend = %frontend, "frontend finished");
                    let _ = done.send(());
                }
            }
            err => {
                kills.fetch_add(err.count() as u64, Ordering::Relaxed);
                tracing::error!(pipeline = %name, error = %err, "pipeline kill");
            }
        }
    }
    tracing::debug!(pipeline = %name, "kill monitor stopped");
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
