//! Graph builder
//!
//! Nodes are declared into an arena and addressed by [`NodeId`]; edges are
//! adjacency lists of ids. `finish` walks the graph from the frontend,
//! wires channels, inserts fan-out or round-robin connectors where a node
//! has several successors and flattens everything into a [`Pipeline`].
//!
//! ```text
//!   +:frontend ──→ 0:decode ──┬──→ 0:etl ──→ $:es        visit order
//!                             └──→ 1:etl ──→ $:influx    (post-order)
//! ```
//!
//! A node is visited once even when several edges reach it; every edge is
//! still wired, so merge targets such as a fan-in see one `connect_from`
//! per incoming edge and appear once in the node list.

use std::fmt;
use std::sync::Arc;

use crate::connector::{FanOutConnector, GroupConnector, RoundRobinConnector};
use crate::error::{PipelineError, Result};
use crate::node::{NodeRef, same_node};
use crate::pipeline::Pipeline;
use crate::scope::BuildScope;

/// Handle of a declared node, only meaningful for the builder that minted it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Traversal bookkeeping for one `finish`
struct VisitContext {
    visited: Vec<bool>,
    listed: Vec<bool>,
    order: Vec<NodeRef>,
}

impl VisitContext {
    fn new(len: usize) -> Self {
        Self {
            visited: vec![false; len],
            listed: vec![false; len],
            order: Vec::with_capacity(len),
        }
    }

    fn list(&mut self, id: NodeId, node: &NodeRef) {
        if !self.listed[id.0] {
            self.listed[id.0] = true;
            self.order.push(Arc::clone(node));
        }
    }
}

/// Pipeline graph builder
pub struct Builder {
    name: String,
    scope: BuildScope,
    nodes: Vec<NodeRef>,
    edges: Vec<Vec<NodeId>>,
    frontend: Option<NodeId>,
    errors: Vec<PipelineError>,
}

impl Builder {
    pub fn new(scope: BuildScope, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope,
            nodes: Vec::new(),
            edges: Vec::new(),
            frontend: None,
            errors: Vec::new(),
        }
    }

    pub fn with_frontend(scope: BuildScope, frontend: NodeRef, name: impl Into<String>) -> Self {
        let mut builder = Self::new(scope, name);
        let id = builder.declare(&frontend);
        builder.set_frontend(id);
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &BuildScope {
        &self.scope
    }

    /// Replace the scope, keeping declared nodes
    pub fn set_scope(&mut self, scope: BuildScope) {
        self.scope = scope;
    }

    /// Register a node, returning the existing id if it was declared before
    pub fn declare(&mut self, node: &NodeRef) -> NodeId {
        if let Some(index) = self.nodes.iter().position(|n| same_node(n, node)) {
            return NodeId(index);
        }
        self.nodes.push(Arc::clone(node));
        self.edges.push(Vec::new());
        NodeId(self.nodes.len() - 1)
    }

    pub fn declare_all<'a>(&mut self, nodes: impl IntoIterator<Item = &'a NodeRef>) -> Vec<NodeId> {
        nodes.into_iter().map(|node| self.declare(node)).collect()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeRef> {
        self.nodes.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Successors of `id` in declaration order
    pub fn edges(&self, id: NodeId) -> &[NodeId] {
        self.edges.get(id.0).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn set_frontend(&mut self, id: NodeId) -> &mut Self {
        if self.node(id).is_none() {
            self.add_error(PipelineError::ItemNotFound(format!("frontend {id}")));
            return self;
        }
        self.frontend = Some(id);
        self
    }

    pub fn frontend(&self) -> Option<NodeId> {
        self.frontend
    }

    pub fn frontend_node(&self) -> Option<NodeRef> {
        self.frontend.and_then(|id| self.node(id)).cloned()
    }

    /// Record the edge `from → to`; repeating an edge is a no-op
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        if self.node(from).is_none() || self.node(to).is_none() {
            self.add_error(PipelineError::ItemNotFound(format!("edge {from} --> {to}")));
            return self;
        }
        let edges = &mut self.edges[from.0];
        if !edges.contains(&to) {
            edges.push(to);
        }
        self
    }

    /// Declare both nodes and connect them
    pub fn connect_refs(&mut self, from: &NodeRef, to: &NodeRef) -> (NodeId, NodeId) {
        let from = self.declare(from);
        let to = self.declare(to);
        self.connect(from, to);
        (from, to)
    }

    /// Connect the frontend to `to`
    pub fn connect_frontend(&mut self, to: NodeId) -> &mut Self {
        match self.frontend {
            Some(frontend) => self.connect(frontend, to),
            None => {
                self.add_error(PipelineError::MissingFrontend);
                self
            }
        }
    }

    /// Connect the nodes one after another
    pub fn connect_nodes(&mut self, ids: &[NodeId]) -> &mut Self {
        for pair in ids.windows(2) {
            self.connect(pair[0], pair[1]);
        }
        self
    }

    /// Keep an error to be returned by `finish`
    pub fn add_error(&mut self, err: PipelineError) {
        tracing::warn!(pipeline = %self.name, error = %err, "build error recorded");
        self.errors.push(err);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Validate and flatten the graph
    pub fn finish(mut self) -> Result<Pipeline> {
        if let Some(err) = PipelineError::from_many(std::mem::take(&mut self.errors)) {
            return Err(err);
        }
        let frontend = self.frontend.ok_or(PipelineError::MissingFrontend)?;

        let mut ctx = VisitContext::new(self.nodes.len());
        ctx.list(frontend, &self.nodes[frontend.0]);
        self.visit(&mut ctx, frontend)?;
        self.check_edges_leak(&ctx)?;

        tracing::debug!(pipeline = %self.name, layout = %self, "pipeline layout");
        Ok(Pipeline::new(
            self.name,
            self.scope.token().clone(),
            ctx.order,
        ))
    }

    fn visit(&self, ctx: &mut VisitContext, root: NodeId) -> Result<()> {
        if ctx.visited[root.0] {
            return Ok(());
        }
        ctx.visited[root.0] = true;

        match self.edges[root.0].as_slice() {
            [] => Ok(()),
            [to] => self.visit_pass_by(ctx, root, *to),
            targets => self.visit_multi_output(ctx, root, targets),
        }
    }

    fn visit_pass_by(&self, ctx: &mut VisitContext, from: NodeId, to: NodeId) -> Result<()> {
        self.check_connect_loop(from, to)?;
        self.visit(ctx, to)?;

        let node = &self.nodes[to.0];
        self.nodes[from.0].connect_to(node)?;
        ctx.list(to, node);
        Ok(())
    }

    fn visit_multi_output(
        &self,
        ctx: &mut VisitContext,
        from: NodeId,
        targets: &[NodeId],
    ) -> Result<()> {
        let source = &self.nodes[from.0];
        let connector: NodeRef = if source.no_copy() {
            Arc::new(RoundRobinConnector::new(&self.scope, source))
        } else {
            Arc::new(FanOutConnector::new(&self.scope, source))
        };
        let group = Arc::new(GroupConnector::new(Arc::clone(&connector)));

        for &to in targets {
            self.check_connect_loop(from, to)?;
            self.visit(ctx, to)?;

            let node = &self.nodes[to.0];
            connector.connect_to(node)?;
            group.join(Arc::clone(node));
        }

        let group: NodeRef = group;
        source.connect_to(&group)?;
        ctx.order.push(group);
        Ok(())
    }

    fn check_connect_loop(&self, from: NodeId, to: NodeId) -> Result<()> {
        if self.is_connect_loop(from, to, 0) {
            return Err(PipelineError::ConnectLoop {
                from: self.nodes[from.0].to_string(),
                to: self.nodes[to.0].to_string(),
            });
        }
        Ok(())
    }

    /// Whether `from` is reachable from `to`
    ///
    /// Walks deeper than the node count only on a cycle, which is
    /// reported as a loop as well.
    fn is_connect_loop(&self, from: NodeId, to: NodeId, depth: usize) -> bool {
        if depth > self.nodes.len() || from == to {
            return true;
        }
        self.edges[to.0]
            .iter()
            .any(|&next| next == from || self.is_connect_loop(from, next, depth + 1))
    }

    fn check_edges_leak(&self, ctx: &VisitContext) -> Result<()> {
        let leaks = ctx
            .visited
            .iter()
            .enumerate()
            .filter(|(_, visited)| !**visited)
            .map(|(index, _)| PipelineError::EdgeLeak(self.nodes[index].to_string()))
            .collect();
        PipelineError::from_many(leaks).map_or(Ok(()), Err)
    }
}

/// Mermaid `graph LR` of declared nodes and edges
impl fmt::Display for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;
        for (index, node) in self.nodes.iter().enumerate() {
            let label = node.to_string().replace('"', "'");
            writeln!(f, "    {}[\"{label}\"]", NodeId(index))?;
        }
        for (index, edges) in self.edges.iter().enumerate() {
            for to in edges {
                writeln!(f, "    {} --> {to}", NodeId(index))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod tests;
