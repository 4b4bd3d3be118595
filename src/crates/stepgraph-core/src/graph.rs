//! Graph structure: nodes, edges, sentinels
//!
//! A graph is a set of named nodes joined by static edges, entered through
//! the virtual [`START`] node and left through the virtual [`END`] node:
//!
//! ```text
//! __start__ ──▶ router ──(route)──▶ confirm ──(route)──▶ answer ──▶ __end__
//!                 │                    │
//!                 └──(route)──▶ __end__ ◀──(route)──┘
//! ```
//!
//! Nodes are built with [`GraphSpec`](crate::GraphSpec) and frozen by
//! [`compile`](crate::GraphSpec::compile).
//!
//! # Handlers
//!
//! A plain node has one [`NodeHandler`]. An *interruptible* node is split at
//! its interrupt boundary into two separately scheduled halves:
//!
//! - the pre-interrupt [`NodeHandler`], which may return
//!   [`StepResult::Interrupt`](crate::StepResult::Interrupt) to suspend the
//!   thread
//! - the post-interrupt [`ResumeHandler`], which receives the resume value
//!   and produces the node's final result
//!
//! Nothing the first half did runs again on resume.

use crate::context::{NodeContext, ResumeInput};
use crate::error::{GraphError, Result};
use crate::state::State;
use crate::step_result::StepResult;
use futures::future::{BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

/// Node identifier
pub type NodeId = String;

/// Virtual entry node; `add_edge(START, n)` makes `n` the entry point
pub const START: &str = "__start__";

/// Virtual terminal node
pub const END: &str = "__end__";

/// Async node handler
pub type NodeHandler =
    Arc<dyn Fn(State, NodeContext) -> BoxFuture<'static, Result<StepResult>> + Send + Sync>;

/// Async post-interrupt handler
pub type ResumeHandler = Arc<
    dyn Fn(State, ResumeInput, NodeContext) -> BoxFuture<'static, Result<StepResult>>
        + Send
        + Sync,
>;

/// Box an async closure into a [`NodeHandler`]
pub fn node_handler<F, Fut>(handler: F) -> NodeHandler
where
    F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepResult>> + Send + 'static,
{
    Arc::new(move |state, ctx| handler(state, ctx).boxed())
}

/// Box an async closure into a [`ResumeHandler`]
pub fn resume_handler<F, Fut>(handler: F) -> ResumeHandler
where
    F: Fn(State, ResumeInput, NodeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepResult>> + Send + 'static,
{
    Arc::new(move |state, input, ctx| handler(state, input, ctx).boxed())
}

/// A processing unit of the graph
#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,

    /// Plain handler, or pre-interrupt half of an interruptible node
    pub handler: NodeHandler,

    /// Post-interrupt half; `None` for plain nodes
    pub resume: Option<ResumeHandler>,
}

impl NodeSpec {
    pub fn is_interruptible(&self) -> bool {
        self.resume.is_some()
    }
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("interruptible", &self.is_interruptible())
            .finish()
    }
}

/// Raw graph definition
///
/// Node and edge order is insertion order so introspection and rendering
/// are deterministic.
#[derive(Clone, Default, Debug)]
pub struct Graph {
    pub(crate) nodes: HashMap<NodeId, NodeSpec>,
    pub(crate) order: Vec<NodeId>,
    /// Static edges by source; `START` is a valid source
    pub(crate) edges: HashMap<NodeId, Vec<NodeId>>,
    /// Declared dynamic-routing targets by node
    pub(crate) routes: HashMap<NodeId, Vec<NodeId>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn successors(&self, id: &str) -> &[NodeId] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check the whole structure
    ///
    /// - exactly one edge leaves `START`
    /// - a node with several static edges must declare routes
    /// - declared route targets exist (or are `END`)
    /// - every node can leave: a static edge or declared routes
    ///
    /// Unreachable nodes are reported as warnings only.
    pub fn validate(&self) -> Result<()> {
        let entries = self.successors(START);
        match entries.len() {
            0 => {
                return Err(GraphError::definition(format!(
                    "no edge from the entry point '{}'",
                    START
                )))
            }
            1 => {}
            _ => {
                return Err(GraphError::definition(format!(
                    "entry point '{}' has {} edges ({}); exactly one is allowed",
                    START,
                    entries.len(),
                    entries.join(", ")
                )))
            }
        }

        for id in &self.order {
            let edges = self.successors(id);
            let routes = self.routes.get(id);

            if edges.len() > 1 && routes.is_none() {
                return Err(GraphError::definition(format!(
                    "node '{}' has {} static edges ({}) but declares no routes to choose between them",
                    id,
                    edges.len(),
                    edges.join(", ")
                )));
            }

            if edges.is_empty() && routes.is_none() {
                return Err(GraphError::definition(format!(
                    "node '{}' is a dead end: add an edge (possibly to '{}') or declare routes",
                    id, END
                )));
            }

            for target in routes.into_iter().flatten() {
                if target != END && !self.contains(target) {
                    return Err(GraphError::definition(format!(
                        "node '{}' declares a route to unknown node '{}'",
                        id, target
                    )));
                }
            }
        }

        for id in self.unreachable() {
            tracing::warn!(node = %id, "Node is unreachable from the entry point");
        }

        Ok(())
    }

    /// Nodes that no edge or declared route reaches from `START`
    pub(crate) fn unreachable(&self) -> Vec<NodeId> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = self.successors(START).iter().map(String::as_str).collect();

        while let Some(id) = queue.pop_front() {
            if id == END || !seen.insert(id) {
                continue;
            }
            let next = self
                .successors(id)
                .iter()
                .chain(self.routes.get(id).into_iter().flatten());
            queue.extend(next.map(String::as_str));
        }

        self.order
            .iter()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> NodeSpec {
        NodeSpec {
            name: "n".into(),
            handler: node_handler(|state, _ctx| async move { Ok(StepResult::Update(state)) }),
            resume: None,
        }
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> Graph {
        let mut g = Graph::new();
        for id in nodes {
            g.nodes.insert(id.to_string(), noop());
            g.order.push(id.to_string());
        }
        for (from, to) in edges {
            g.edges.entry(from.to_string()).or_default().push(to.to_string());
        }
        g
    }

    #[test]
    fn test_linear_graph_is_valid() {
        let g = graph(&["a", "b"], &[(START, "a"), ("a", "b"), ("b", END)]);
        assert!(g.validate().is_ok());
        assert!(g.unreachable().is_empty());
    }

    #[test]
    fn test_missing_entry_edge() {
        let g = graph(&["a"], &[("a", END)]);
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("no edge from the entry point"));
    }

    #[test]
    fn test_ambiguous_static_edges() {
        let g = graph(&["a", "b", "c"], &[(START, "a"), ("a", "b"), ("a", "c"), ("b", END), ("c", END)]);
        let err = g.validate().unwrap_err();
        assert!(matches!(err, GraphError::GraphDefinition(ref m) if m.contains("declares no routes")));
    }

    #[test]
    fn test_routes_disambiguate_static_edges() {
        let mut g = graph(&["a", "b", "c"], &[(START, "a"), ("a", "b"), ("a", "c"), ("b", END), ("c", END)]);
        g.routes.insert("a".into(), vec!["b".into(), "c".into()]);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_unknown_route_target() {
        let mut g = graph(&["a"], &[(START, "a")]);
        g.routes.insert("a".into(), vec!["ghost".into()]);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_dead_end() {
        let g = graph(&["a", "b"], &[(START, "a"), ("a", "b")]);
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("dead end"));
    }

    #[test]
    fn test_unreachable_is_not_an_error() {
        let g = graph(&["a", "orphan"], &[(START, "a"), ("a", END), ("orphan", END)]);
        assert!(g.validate().is_ok());
        assert_eq!(g.unreachable(), vec!["orphan".to_string()]);
    }
}
