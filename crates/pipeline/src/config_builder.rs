//! Configuration driven pipeline assembly
//!
//! [`ConfigBuilder`] resolves frontends, backends and processors from the
//! [`Registry`] using the configuration carried by the [`BuildScope`], and
//! lays out one branch per result table:
//!
//! ```text
//!                    multi_num == 1
//!   +:frontend ──→ [callback chain] ──→ $:backend
//!
//!                    multi_num > 1
//!   +:frontend ──→ passer ──rr──┬──→ [lane 0 chain] ──┐
//!                               └──→ [lane 1 chain] ──┴──→ fan-in ──→ $:backend
//! ```
//!
//! The callback splices the ETL specific processors between the branch
//! start and its backend. In strict mode any per-table failure aborts the
//! build; otherwise the table is logged and skipped.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use transfer_config::{
    BackendFields, PipelineConfig, RecordFields, ResultTableConfig, RuntimeConfig, ShipperConfig,
};

use crate::builder::Builder;
use crate::connector::{ChainConnector, FanInConnector};
use crate::error::{PipelineError, Result};
use crate::node::{BackendNode, FrontendNode, GluttonousNode, NodeRef, ProcessNode};
use crate::pipeline::Pipeline;
use crate::registry::Registry;
use crate::scope::BuildScope;

/// Splices a branch between `from` and `to`
///
/// Called once per lane with the scope of that lane. The callback declares
/// and connects its own nodes on the builder.
pub type BranchingCallback<'a> =
    dyn FnMut(&mut ConfigBuilder, &BuildScope, &NodeRef, &NodeRef) -> Result<()> + 'a;

type InitFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Builder resolving components from configuration
pub struct ConfigBuilder {
    builder: Builder,
    registry: Arc<Registry>,
    frontend_wait_delay: Duration,
    pipeline_init: Option<InitFn<PipelineConfig>>,
    result_table_init: Option<InitFn<ResultTableConfig>>,
    shipper_init: Option<InitFn<ShipperConfig>>,
}

impl ConfigBuilder {
    pub fn new(scope: BuildScope, registry: Arc<Registry>, name: impl Into<String>) -> Self {
        let frontend_wait_delay = scope.global().frontend_wait_delay;
        Self {
            builder: Builder::new(scope, name),
            registry,
            frontend_wait_delay,
            pipeline_init: None,
            result_table_init: None,
            shipper_init: None,
        }
    }

    #[must_use]
    pub fn with_frontend_wait_delay(mut self, delay: Duration) -> Self {
        self.frontend_wait_delay = delay;
        self
    }

    /// Normalize the pipeline configuration before branching
    #[must_use]
    pub fn with_pipeline_init(mut self, init: impl Fn(&mut PipelineConfig) + Send + Sync + 'static) -> Self {
        self.pipeline_init = Some(Box::new(init));
        self
    }

    /// Normalize every result table before its branch is built
    #[must_use]
    pub fn with_result_table_init(
        mut self,
        init: impl Fn(&mut ResultTableConfig) + Send + Sync + 'static,
    ) -> Self {
        self.result_table_init = Some(Box::new(init));
        self
    }

    /// Normalize every shipper, the frontend's `mq_config` included
    #[must_use]
    pub fn with_shipper_init(mut self, init: impl Fn(&mut ShipperConfig) + Send + Sync + 'static) -> Self {
        self.shipper_init = Some(Box::new(init));
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn into_builder(self) -> Builder {
        self.builder
    }

    pub fn finish(self) -> Result<Pipeline> {
        self.builder.finish()
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Frontend node for the pipeline's `mq_config`
    pub fn frontend_node(&self, scope: &BuildScope) -> Result<NodeRef> {
        let mut mq = scope.pipeline().mq_config.clone();
        if let Some(init) = &self.shipper_init {
            init(&mut mq);
        }
        if mq.cluster_type.is_empty() {
            return Err(PipelineError::ItemNotFound(format!(
                "mq_config of {}",
                scope.pipeline().name()
            )));
        }

        let scope = scope.for_shipper(Arc::new(mq.clone()));
        let frontend = self.registry.create_frontend(&mq.cluster_type, &scope)?;
        Ok(Arc::new(FrontendNode::new(&scope, frontend, self.frontend_wait_delay)))
    }

    /// Create and set the frontend, recording any failure for `finish`
    pub fn setup_frontend(&mut self) -> &mut Self {
        let scope = self.scope().clone();
        match self.frontend_node(&scope) {
            Ok(node) => {
                let id = self.declare(&node);
                self.set_frontend(id);
            }
            Err(e) => self.add_error(e),
        }
        self
    }

    /// Connect the frontend to `to`, creating the frontend first if needed
    pub fn connect_frontend_node(&mut self, to: &NodeRef) -> &mut Self {
        if self.frontend().is_none() {
            self.setup_frontend();
        }
        let to = self.declare(to);
        self.builder.connect_frontend(to);
        self
    }

    /// Backend of the scope's result table
    ///
    /// One node per shipper; several shippers are chained so each payload
    /// is written to all of them. `None` when the table has no shipper.
    pub fn backend_for(
        &self,
        scope: &BuildScope,
        fields: Option<&RecordFields>,
    ) -> Result<Option<NodeRef>> {
        let table = scope
            .result_table()
            .ok_or_else(|| PipelineError::ItemNotFound("result table of backend scope".into()))?;

        let mut nodes: Vec<NodeRef> = Vec::with_capacity(table.shipper_list.len());
        for shipper in &table.shipper_list {
            let mut shipper = shipper.clone();
            if let Some(init) = &self.shipper_init {
                init(&mut shipper);
            }
            let scope = scope.for_shipper(Arc::new(shipper.clone()));
            let backend = self
                .registry
                .create_backend(&shipper.cluster_type, &scope)
                .map_err(|e| {
                    PipelineError::build(format!(
                        "create backend by type {}: {e}",
                        shipper.cluster_type
                    ))
                })?;
            if let Some(fields) = fields {
                backend.set_record_fields(fields.clone());
            }
            nodes.push(Arc::new(BackendNode::new(&scope, backend)));
        }

        match nodes.len() {
            0 => Ok(None),
            1 => Ok(nodes.pop()),
            _ => Ok(Some(Arc::new(ChainConnector::new(scope, nodes)?))),
        }
    }

    /// Process node for the processor registered as `name`
    pub fn data_processor(&self, scope: &BuildScope, name: &str) -> Result<NodeRef> {
        let processor = self.registry.create_processor(name, scope)?;
        Ok(Arc::new(ProcessNode::new(scope, processor)))
    }

    pub fn data_processors<S: AsRef<str>>(
        &self,
        scope: &BuildScope,
        names: &[S],
    ) -> Result<Vec<NodeRef>> {
        names
            .iter()
            .map(|name| self.data_processor(scope, name.as_ref()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Branching
    // ------------------------------------------------------------------

    /// Branch that tolerates result tables without backend
    pub fn build_branching_with_gluttonous(
        self,
        from: Option<NodeRef>,
        callback: &mut BranchingCallback<'_>,
    ) -> Result<Pipeline> {
        self.build_branching(from, true, callback)
    }

    /// One branch per result table, from `from` (the frontend if `None`)
    pub fn build_branching(
        mut self,
        from: Option<NodeRef>,
        allow_gluttonous: bool,
        callback: &mut BranchingCallback<'_>,
    ) -> Result<Pipeline> {
        let strict = self.scope().global().strict_mode;
        let Some(from) = self.branch_start(from) else {
            return self.finish();
        };

        let pipeline = self.init_pipeline()?;
        if pipeline.result_table_list.is_empty() {
            return Err(PipelineError::EmptyResultTables(pipeline.name()));
        }

        for table in &pipeline.result_table_list {
            if table.result_table.is_empty() {
                tracing::warn!(
                    pipeline = %pipeline.name(),
                    "result table without name skipped"
                );
                continue;
            }

            let mut table = table.clone();
            if let Some(init) = &self.result_table_init {
                init(&mut table);
            }
            let name = table.result_table.clone();
            let multi_num = table_multi_num(&table);
            let scope = self.scope().for_result_table(Arc::new(table));

            let backend = match self.backend_for(&scope, None) {
                Ok(Some(backend)) => backend,
                Ok(None) if allow_gluttonous => Arc::new(GluttonousNode::new(&scope)),
                Ok(None) => {
                    tracing::warn!(table = %name, "result table has no backend, skipped");
                    continue;
                }
                Err(e) if strict => {
                    return Err(PipelineError::build(format!(
                        "get result table {name} backend failed: {e}"
                    )));
                }
                Err(e) => {
                    tracing::warn!(table = %name, error = %e, "get result table backend failed, skipped");
                    continue;
                }
            };

            self.branch_lanes(&scope, &from, backend, multi_num, strict, callback)?;
        }

        tracing::debug!(pipeline = %pipeline.name(), layout = %self.builder, "branching built");
        self.finish()
    }

    /// Two branches for log clustering
    ///
    /// With `is_log_cluster` off only the first result table is built, with
    /// `flat`. Otherwise the raw log and pattern tables share one branch
    /// built with `cluster`, ending in a chain of both backends.
    pub fn build_branching_for_log_cluster(
        mut self,
        from: Option<NodeRef>,
        flat: &mut BranchingCallback<'_>,
        cluster: &mut BranchingCallback<'_>,
    ) -> Result<Pipeline> {
        let mut pipeline = self.scope().pipeline().clone();
        if !pipeline.is_log_cluster()? {
            pipeline.result_table_list.truncate(1);
            let scope = self.scope().for_pipeline(pipeline);
            self.set_scope(scope);
            return self.build_branching(from, true, flat);
        }

        let strict = self.scope().global().strict_mode;
        let fields = BackendFields::from_options(&pipeline.option)?;
        let Some(from) = self.branch_start(from) else {
            return self.finish();
        };

        if pipeline.result_table_list.is_empty() {
            return Err(PipelineError::EmptyResultTables(pipeline.name()));
        }
        if pipeline.result_table_list.len() != 2 {
            return Err(PipelineError::build(format!(
                "log cluster pipeline {} needs a raw and a pattern result table, got {}",
                pipeline.name(),
                pipeline.result_table_list.len()
            )));
        }
        let pipeline = self.init_pipeline()?;

        let mut raw = pipeline.result_table_list[0].clone();
        let mut pattern = pipeline.result_table_list[1].clone();
        if let Some(init) = &self.result_table_init {
            init(&mut raw);
            init(&mut pattern);
        }
        // the pattern index is derived from the raw log
        pattern.field_list = raw.field_list.clone();

        let multi_num = table_multi_num(&raw);
        let raw_scope = self.scope().for_result_table(Arc::new(raw));
        let pattern_scope = self.scope().for_result_table(Arc::new(pattern));

        let mut backends = Vec::with_capacity(2);
        for (scope, fields) in [
            (&raw_scope, fields.raw_es.as_ref()),
            (&pattern_scope, fields.pattern_es.as_ref()),
        ] {
            match self.backend_for(scope, fields) {
                Ok(backend) => backends.extend(backend),
                Err(e) if strict => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "get log cluster backend failed, skipped");
                }
            }
        }

        let backend: NodeRef = if backends.is_empty() {
            Arc::new(GluttonousNode::new(&raw_scope))
        } else {
            Arc::new(ChainConnector::new(&raw_scope, backends)?)
        };
        self.branch_lanes(&raw_scope, &from, backend, multi_num, strict, cluster)?;

        tracing::debug!(pipeline = %pipeline.name(), layout = %self.builder, "log cluster branching built");
        self.finish()
    }

    /// Start node of the branches, `None` if no frontend could be set up
    fn branch_start(&mut self, from: Option<NodeRef>) -> Option<NodeRef> {
        if let Some(from) = from {
            self.declare(&from);
            return Some(from);
        }
        if self.frontend().is_none() {
            self.setup_frontend();
        }
        self.builder.frontend_node()
    }

    /// Run the pipeline init hook and narrow the scope to the result
    fn init_pipeline(&mut self) -> Result<PipelineConfig> {
        let mut pipeline = self.scope().pipeline().clone();
        if let Some(init) = &self.pipeline_init {
            init(&mut pipeline);
            pipeline.clean();
            pipeline.validate()?;
            let scope = self.scope().for_pipeline(pipeline.clone());
            self.set_scope(scope);
        }
        Ok(pipeline)
    }

    /// Wire `multi_num` lanes of `callback` between `from` and `backend`
    fn branch_lanes(
        &mut self,
        scope: &BuildScope,
        from: &NodeRef,
        backend: NodeRef,
        multi_num: usize,
        strict: bool,
        callback: &mut BranchingCallback<'_>,
    ) -> Result<()> {
        let name = scope
            .result_table()
            .map(|t| t.result_table.clone())
            .unwrap_or_default();

        let (start, end) = if multi_num > 1 {
            let passer = self.data_processor(scope, "passer")?;
            passer.set_no_copy(true);
            self.connect_refs(from, &passer);
            let merged: NodeRef = Arc::new(FanInConnector::new(scope, backend)?);
            (passer, merged)
        } else {
            (Arc::clone(from), backend)
        };
        tracing::debug!(table = %name, multi_num, "building branch lanes");

        for index in 0..multi_num {
            let lane = scope.for_runtime(RuntimeConfig {
                pipeline_count: index,
            });
            if let Err(e) = callback(self, &lane, &start, &end) {
                if strict {
                    return Err(PipelineError::build(format!(
                        "create branching by {name} failed: {e}"
                    )));
                }
                tracing::warn!(table = %name, lane = index, error = %e, "create branch lane failed, skipped");
            }
        }
        Ok(())
    }
}

/// Lane count of `table`, an unreadable option falls back to the field
fn table_multi_num(table: &ResultTableConfig) -> usize {
    table.effective_multi_num().unwrap_or_else(|e| {
        tracing::warn!(table = %table.result_table, error = %e, "invalid multi_num option ignored");
        table.multi_num.max(1)
    })
}

impl Deref for ConfigBuilder {
    type Target = Builder;

    fn deref(&self) -> &Builder {
        &self.builder
    }
}

impl DerefMut for ConfigBuilder {
    fn deref_mut(&mut self) -> &mut Builder {
        &mut self.builder
    }
}

#[cfg(test)]
#[path = "config_builder_test.rs"]
mod tests;
