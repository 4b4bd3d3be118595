//! Immutable, runnable graph
//!
//! A [`CompiledGraph`] is produced by [`GraphSpec::compile`](crate::GraphSpec::compile)
//! and never changes afterwards. It is shared (behind an `Arc`) by an
//! [`ExecutionEngine`](crate::ExecutionEngine) and all of its concurrent
//! runs.

use crate::graph::{Graph, NodeId, NodeSpec, START};

#[derive(Debug, Clone)]
pub struct CompiledGraph {
    graph: Graph,
    entry: NodeId,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph) -> Self {
        // validate() guarantees exactly one START edge
        let entry = graph.successors(START).first().cloned().unwrap_or_default();
        Self { graph, entry }
    }

    /// First node executed for a new input
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Node ids in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.order.iter().map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.graph.contains(id)
    }

    /// Static edges as `(from, to)` pairs, the entry edge first
    pub fn edges(&self) -> Vec<(&str, &str)> {
        std::iter::once(START)
            .chain(self.node_ids())
            .flat_map(|from| {
                self.graph
                    .successors(from)
                    .iter()
                    .map(move |to| (from, to.as_str()))
            })
            .collect()
    }

    /// Static successors of a node
    pub fn successors(&self, id: &str) -> &[NodeId] {
        self.graph.successors(id)
    }

    /// Declared routing targets, `None` if the node does not route
    pub fn routes(&self, id: &str) -> Option<&[NodeId]> {
        self.graph.routes.get(id).map(Vec::as_slice)
    }

    pub fn is_interruptible(&self, id: &str) -> bool {
        self.graph
            .nodes
            .get(id)
            .map_or(false, NodeSpec::is_interruptible)
    }

    pub(crate) fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.graph.nodes.get(id)
    }
}
