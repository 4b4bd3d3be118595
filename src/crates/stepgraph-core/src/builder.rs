//! Graph builder
//!
//! [`GraphSpec`] collects nodes, edges and declared routes, then
//! [`compile`](GraphSpec::compile)s them into an immutable
//! [`CompiledGraph`]. Local mistakes (duplicate node, edge to an unknown
//! node) fail at the call that makes them; whole-graph rules are checked by
//! `compile`.
//!
//! ```rust
//! use stepgraph_core::{GraphSpec, Message, State, StepResult, END, START};
//!
//! # fn main() -> stepgraph_core::Result<()> {
//! let mut spec = GraphSpec::new();
//! spec.add_node("greet", |_state, _ctx| async move {
//!     Ok(StepResult::update(State::from_message(Message::assistant("hello"))))
//! })?;
//! spec.add_edge(START, "greet")?;
//! spec.add_edge("greet", END)?;
//!
//! let graph = spec.compile()?;
//! assert_eq!(graph.entry(), "greet");
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::context::{NodeContext, ResumeInput};
use crate::error::{GraphError, Result};
use crate::graph::{node_handler, resume_handler, Graph, NodeId, NodeSpec, END, START};
use crate::state::State;
use crate::step_result::StepResult;
use std::future::Future;

/// Mutable graph definition
#[derive(Default, Debug)]
pub struct GraphSpec {
    graph: Graph,
}

impl GraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain node
    ///
    /// # Errors
    ///
    /// `GraphDefinition` if the id is empty, reserved, or already used.
    pub fn add_node<F, Fut>(&mut self, id: impl Into<NodeId>, handler: F) -> Result<&mut Self>
    where
        F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepResult>> + Send + 'static,
    {
        let id = id.into();
        self.insert(NodeSpec {
            name: id,
            handler: node_handler(handler),
            resume: None,
        })
    }

    /// Add a node split at its interrupt boundary
    ///
    /// `before` runs when the node is scheduled and may return
    /// [`StepResult::Interrupt`]. `after` runs on resume with the caller's
    /// value and produces the node's final result; it may interrupt again.
    pub fn add_interruptible_node<B, BFut, A, AFut>(
        &mut self,
        id: impl Into<NodeId>,
        before: B,
        after: A,
    ) -> Result<&mut Self>
    where
        B: Fn(State, NodeContext) -> BFut + Send + Sync + 'static,
        BFut: Future<Output = Result<StepResult>> + Send + 'static,
        A: Fn(State, ResumeInput, NodeContext) -> AFut + Send + Sync + 'static,
        AFut: Future<Output = Result<StepResult>> + Send + 'static,
    {
        let id = id.into();
        self.insert(NodeSpec {
            name: id,
            handler: node_handler(before),
            resume: Some(resume_handler(after)),
        })
    }

    fn insert(&mut self, spec: NodeSpec) -> Result<&mut Self> {
        let id = spec.name.clone();
        if id.is_empty() {
            return Err(GraphError::definition("node id must not be empty"));
        }
        if id == START || id == END {
            return Err(GraphError::definition(format!(
                "'{}' is reserved and cannot be used as a node id",
                id
            )));
        }
        if self.graph.contains(&id) {
            return Err(GraphError::definition(format!("duplicate node id '{}'", id)));
        }

        self.graph.order.push(id.clone());
        self.graph.nodes.insert(id, spec);
        Ok(self)
    }

    /// Add a static edge
    ///
    /// `from` is a node or [`START`]; `to` is a node or [`END`]. Both nodes
    /// must already exist.
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Result<&mut Self> {
        let (from, to) = (from.into(), to.into());

        if from != START && !self.graph.contains(&from) {
            return Err(GraphError::definition(format!(
                "edge source '{}' is not a node",
                from
            )));
        }
        if to != END && !self.graph.contains(&to) {
            return Err(GraphError::definition(format!(
                "edge target '{}' is not a node",
                to
            )));
        }
        if from == START && to == END {
            return Err(GraphError::definition(format!(
                "the entry point must lead to a node, not '{}'",
                END
            )));
        }

        let edges = self.graph.edges.entry(from.clone()).or_default();
        if edges.contains(&to) {
            return Err(GraphError::definition(format!(
                "duplicate edge '{}' -> '{}'",
                from, to
            )));
        }
        edges.push(to);
        Ok(self)
    }

    /// Declare that `id` routes dynamically, and to which targets
    ///
    /// Targets are checked by [`compile`](Self::compile) so nodes may be
    /// added afterwards. [`END`] is always a valid target.
    pub fn add_routes<I, S>(&mut self, id: impl Into<NodeId>, targets: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let id = id.into();
        if !self.graph.contains(&id) {
            return Err(GraphError::definition(format!(
                "cannot declare routes for unknown node '{}'",
                id
            )));
        }

        let declared = self.graph.routes.entry(id).or_default();
        for target in targets {
            let target = target.into();
            if !declared.contains(&target) {
                declared.push(target);
            }
        }
        Ok(self)
    }

    /// Validate and freeze the graph
    pub fn compile(self) -> Result<CompiledGraph> {
        self.graph.validate()?;
        Ok(CompiledGraph::new(self.graph))
    }
}
