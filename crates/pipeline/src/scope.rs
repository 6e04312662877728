//! Build scope
//!
//! Everything a component factory needs to know while a pipeline is being
//! assembled: the runtime settings, the pipeline being built and, while a
//! branch is resolved, the result table, shipper and lane it belongs to.
//! The scope also carries the cancellation token nodes derive theirs from.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use transfer_config::{GlobalConfig, PipelineConfig, ResultTableConfig, RuntimeConfig, ShipperConfig};

use crate::metrics::MetricsBoard;

/// Per-build configuration scope
#[derive(Debug, Clone)]
pub struct BuildScope {
    token: CancellationToken,
    global: Arc<GlobalConfig>,
    pipeline: Arc<PipelineConfig>,
    result_table: Option<Arc<ResultTableConfig>>,
    shipper: Option<Arc<ShipperConfig>>,
    runtime: Option<RuntimeConfig>,
    board: Option<Arc<MetricsBoard>>,
}

impl BuildScope {
    /// Root scope for one pipeline
    pub fn new(global: Arc<GlobalConfig>, pipeline: PipelineConfig) -> Self {
        Self {
            token: CancellationToken::new(),
            global,
            pipeline: Arc::new(pipeline),
            result_table: None,
            shipper: None,
            runtime: None,
            board: None,
        }
    }

    /// Root scope with default settings
    pub fn detached() -> Self {
        Self::new(Arc::new(GlobalConfig::default()), PipelineConfig::default())
    }

    /// Replace the root token
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Board where components publish their counters
    #[must_use]
    pub fn with_metrics_board(mut self, board: Arc<MetricsBoard>) -> Self {
        self.board = Some(board);
        self
    }

    /// Same scope with a replaced pipeline configuration
    #[must_use]
    pub fn for_pipeline(&self, pipeline: PipelineConfig) -> Self {
        let mut scope = self.clone();
        scope.pipeline = Arc::new(pipeline);
        scope
    }

    /// Scope narrowed to one result table
    #[must_use]
    pub fn for_result_table(&self, table: Arc<ResultTableConfig>) -> Self {
        let mut scope = self.clone();
        scope.result_table = Some(table);
        scope
    }

    /// Scope narrowed to one shipper
    #[must_use]
    pub fn for_shipper(&self, shipper: Arc<ShipperConfig>) -> Self {
        let mut scope = self.clone();
        scope.shipper = Some(shipper);
        scope
    }

    /// Scope narrowed to one lane
    #[must_use]
    pub fn for_runtime(&self, runtime: RuntimeConfig) -> Self {
        let mut scope = self.clone();
        scope.runtime = Some(runtime);
        scope
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Token for a new node, cancelled with the pipeline
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn global_arc(&self) -> Arc<GlobalConfig> {
        Arc::clone(&self.global)
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn result_table(&self) -> Option<&ResultTableConfig> {
        self.result_table.as_deref()
    }

    pub fn shipper(&self) -> Option<&ShipperConfig> {
        self.shipper.as_deref()
    }

    pub fn runtime(&self) -> Option<RuntimeConfig> {
        self.runtime
    }

    pub fn metrics_board(&self) -> Option<&Arc<MetricsBoard>> {
        self.board.as_ref()
    }

    /// Lane index, 0 outside a lane
    pub fn pipeline_count(&self) -> usize {
        self.runtime.map(|r| r.pipeline_count).unwrap_or_default()
    }

    /// Backend worker count of the current result table
    pub fn multi_num(&self) -> usize {
        self.result_table
            .as_ref()
            .map(|t| t.effective_multi_num().unwrap_or(t.multi_num))
            .unwrap_or(1)
            .max(1)
    }

    pub fn channel_size(&self) -> usize {
        self.global.effective_channel_size()
    }

    pub fn concurrency(&self) -> usize {
        self.global.effective_concurrency()
    }
}
