//! # stepgraph-core - Durable graph execution with interrupts
//!
//! `stepgraph-core` runs a small directed graph of async steps against a
//! conversation state, one thread of conversation at a time:
//!
//! - **Durable steps** - a checkpoint is appended after every node; a step
//!   that was not persisted never happened
//! - **Pause/resume** - a node can suspend the thread with a payload and be
//!   completed later, even after a process restart
//! - **Streaming** - observe state, updates, checkpoints and node boundaries
//!   while a run progresses
//! - **Thread isolation** - calls on one thread are serialized, different
//!   threads run concurrently
//!
//! ## Core Concepts
//!
//! ### 1. GraphSpec → CompiledGraph
//!
//! [`GraphSpec`] collects nodes and edges. [`compile`](GraphSpec::compile)
//! checks the structure (entry edge, ambiguous edges, dead ends) and returns
//! an immutable [`CompiledGraph`].
//!
//! ### 2. StepResult
//!
//! Every handler returns a [`StepResult`]:
//! - `Update(partial)` - merge and follow the static edge
//! - `Route { update, goto }` - merge and jump to explicit nodes
//! - `Interrupt { update, payload }` - merge and suspend
//!
//! ### 3. State
//!
//! [`State`] holds an append-only message history plus overwrite-on-merge
//! fields.
//!
//! ### 4. Interruptible nodes
//!
//! [`GraphSpec::add_interruptible_node`] splits a node into a pre-interrupt
//! half that produces the payload and a post-interrupt half that receives
//! the resume value. Nothing runs twice on resume.
//!
//! ### 5. ExecutionEngine
//!
//! [`ExecutionEngine`] owns the compiled graph, a
//! [`CheckpointStore`](stepgraph_checkpoint::CheckpointStore) and an
//! optional [`CompletionService`], and exposes `run`, `resume`, `stream`,
//! `stream_resume`, `get_state`, `get_state_history` and `update_state`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stepgraph_core::{
//!     ExecutionEngine, GraphSpec, Message, RunConfig, State, StepResult, END, START,
//! };
//! use stepgraph_checkpoint::SqliteCheckpointStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut spec = GraphSpec::new();
//!     spec.add_node("router", |state: State, _ctx| async move {
//!         let has_question = state.last_message().map_or(false, |m| m.is_human());
//!         Ok(if has_question {
//!             StepResult::route("confirm")
//!         } else {
//!             StepResult::route(END)
//!         })
//!     })?;
//!     spec.add_routes("router", ["confirm", END])?;
//!     spec.add_interruptible_node(
//!         "confirm",
//!         |_state, _ctx| async move { Ok(StepResult::interrupt("answer now? yes/no")) },
//!         |_state, input, _ctx| async move {
//!             let reply = if input.as_str() == Some("yes") { "sure" } else { "skipped" };
//!             Ok(StepResult::route(END).with_update(Message::assistant(reply)))
//!         },
//!     )?;
//!     spec.add_routes("confirm", [END])?;
//!     spec.add_edge(START, "router")?;
//!
//!     let store = Arc::new(SqliteCheckpointStore::open("threads.sqlite").await?);
//!     let engine = ExecutionEngine::new(spec.compile()?, store);
//!
//!     let outcome = engine
//!         .run("t-1", Message::human("hi").into(), RunConfig::new())
//!         .await?;
//!     if let Some((node, payload)) = outcome.interrupt() {
//!         println!("{} asks: {}", node, payload);
//!         engine.resume("t-1", "yes", RunConfig::new()).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  run / resume   ┌──────────────────┐  append / get_latest  ┌─────────────────┐
//! │   caller   │ ──────────────▶ │ ExecutionEngine  │ ────────────────────▶ │ CheckpointStore │
//! │            │ ◀────────────── │  (step loop)     │                       │ (memory/sqlite) │
//! └────────────┘  RunOutcome /   └────────┬─────────┘                       └─────────────────┘
//!                 RunStream               │ NodeContext
//!                                         ▼
//!                                ┌──────────────────┐
//!                                │ node handlers ──▶ CompletionService
//!                                └──────────────────┘
//! ```

pub mod builder;
pub mod compiled;
pub mod completion;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod messages;
pub mod state;
pub mod step_result;
pub mod stream;
pub mod visualization;

pub use builder::GraphSpec;
pub use compiled::CompiledGraph;
pub use completion::CompletionService;
pub use config::{ConcurrencyPolicy, EngineOptions, RunConfig};
pub use context::{NodeContext, ResumeInput};
pub use engine::{ExecutionEngine, RunOutcome, StateSnapshot};
pub use error::{GraphError, Result};
pub use graph::{NodeId, END, START};
pub use messages::{Message, MessageRole};
pub use state::State;
pub use step_result::StepResult;
pub use stream::{RunStream, StreamEvent, StreamMode};
