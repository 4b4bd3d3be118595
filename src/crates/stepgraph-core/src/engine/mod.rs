//! Durable execution of a compiled graph
//!
//! [`ExecutionEngine`] drives runs of one [`CompiledGraph`] against a
//! [`CheckpointStore`], one thread at a time per `thread_id`:
//!
//! 1. load the thread's latest checkpoint
//! 2. pick the frontier: the entry node for new input, the queued frontier
//!    of an abandoned run, or the interrupted node on resume
//! 3. run nodes one per step, merge their partial state, and append a
//!    checkpoint after every node, before anything is emitted
//! 4. stop when the frontier empties ([`RunOutcome::Complete`]) or a node
//!    interrupts ([`RunOutcome::Interrupted`])
//!
//! A step whose handler fails, or whose checkpoint cannot be appended,
//! leaves no trace: the thread stays at its last checkpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use stepgraph_core::{
//!     ExecutionEngine, GraphSpec, Message, RunConfig, State, StepResult, END, START,
//! };
//! use stepgraph_checkpoint::InMemoryCheckpointStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> stepgraph_core::Result<()> {
//! let mut spec = GraphSpec::new();
//! spec.add_interruptible_node(
//!     "confirm",
//!     |_state, _ctx| async move { Ok(StepResult::interrupt("proceed? yes/no")) },
//!     |_state, input, _ctx| async move {
//!         let reply = if input.as_str() == Some("yes") { "proceeding" } else { "stopped" };
//!         Ok(StepResult::update(State::from_message(Message::assistant(reply))))
//!     },
//! )?;
//! spec.add_edge(START, "confirm")?;
//! spec.add_edge("confirm", END)?;
//!
//! let engine = ExecutionEngine::new(spec.compile()?, Arc::new(InMemoryCheckpointStore::new()));
//!
//! let outcome = engine
//!     .run("thread-1", State::from_message(Message::human("go")), RunConfig::new())
//!     .await?;
//! assert!(outcome.is_interrupted());
//!
//! let outcome = engine.resume("thread-1", "yes", RunConfig::new()).await?;
//! assert_eq!(outcome.state().last_message().map(|m| m.text()), Some("proceeding"));
//! # Ok(())
//! # }
//! ```

mod execution;
mod locks;
mod state;
mod types;

pub use types::{RunOutcome, StateSnapshot};

use crate::compiled::CompiledGraph;
use crate::completion::CompletionService;
use crate::config::{EngineOptions, RunConfig};
use crate::error::Result;
use crate::state::State;
use crate::stream::{RunStream, StreamMode, StreamMultiplexer};
use execution::Start;
use locks::{ThreadGuard, ThreadLocks};
use serde_json::Value;
use std::sync::Arc;
use stepgraph_checkpoint::CheckpointStore;
use tokio::sync::mpsc;

/// Runs a compiled graph with durable checkpoints
///
/// Cheap to clone; clones share the graph, the store and the thread locks.
#[derive(Clone)]
pub struct ExecutionEngine {
    graph: Arc<CompiledGraph>,
    store: Arc<dyn CheckpointStore>,
    completion: Option<Arc<dyn CompletionService>>,
    options: EngineOptions,
    locks: ThreadLocks,
}

impl ExecutionEngine {
    pub fn new(graph: CompiledGraph, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph: Arc::new(graph),
            store,
            completion: None,
            options: EngineOptions::default(),
            locks: ThreadLocks::new(),
        }
    }

    /// Inject the completion service handed to handlers
    pub fn with_completion(mut self, service: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(service);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run a thread with new input until it completes or interrupts
    ///
    /// Non-empty `input` is merged into the thread's state and execution
    /// starts at the entry node. Empty input on a thread whose last run was
    /// abandoned mid-way continues that run's frontier.
    ///
    /// # Errors
    ///
    /// - `PendingInterrupt` if the thread is suspended; use [`resume`](Self::resume)
    /// - `ThreadBusy` if another call for the thread is in flight (Reject policy)
    /// - `HandlerExecution` / `ExternalService` / `Persistence` if a step failed
    #[tracing::instrument(skip(self, input, config), fields(thread_id = %thread_id))]
    pub async fn run(&self, thread_id: &str, input: State, config: RunConfig) -> Result<RunOutcome> {
        let _guard = self.lock(thread_id).await?;
        self.execute(
            thread_id,
            Start::Input(input),
            Arc::new(config),
            &StreamMultiplexer::disabled(),
        )
        .await
    }

    /// Resolve a pending interrupt with `value` and continue the run
    ///
    /// # Errors
    ///
    /// `ResumeMismatch` if the thread is not suspended. The thread is left
    /// untouched.
    #[tracing::instrument(skip(self, value, config), fields(thread_id = %thread_id))]
    pub async fn resume(
        &self,
        thread_id: &str,
        value: impl Into<Value>,
        config: RunConfig,
    ) -> Result<RunOutcome> {
        let _guard = self.lock(thread_id).await?;
        self.execute(
            thread_id,
            Start::Resume(value.into()),
            Arc::new(config),
            &StreamMultiplexer::disabled(),
        )
        .await
    }

    /// Streaming variant of [`run`](Self::run)
    ///
    /// The thread lock is taken before this returns, so a busy thread is
    /// reported here rather than through the stream.
    pub async fn stream(
        &self,
        thread_id: &str,
        input: State,
        config: RunConfig,
        modes: &[StreamMode],
    ) -> Result<RunStream> {
        let guard = self.lock(thread_id).await?;
        Ok(self.spawn_stream(thread_id, Start::Input(input), config, modes, guard))
    }

    /// Streaming variant of [`resume`](Self::resume)
    pub async fn stream_resume(
        &self,
        thread_id: &str,
        value: impl Into<Value>,
        config: RunConfig,
        modes: &[StreamMode],
    ) -> Result<RunStream> {
        let guard = self.lock(thread_id).await?;
        Ok(self.spawn_stream(
            thread_id,
            Start::Resume(value.into()),
            config,
            modes,
            guard,
        ))
    }

    async fn lock(&self, thread_id: &str) -> Result<ThreadGuard> {
        self.locks.acquire(thread_id, self.options.concurrency).await
    }

    fn spawn_stream(
        &self,
        thread_id: &str,
        start: Start,
        config: RunConfig,
        modes: &[StreamMode],
        guard: ThreadGuard,
    ) -> RunStream {
        let (tx, rx) = mpsc::channel(self.options.stream_buffer.max(1));
        let mux = StreamMultiplexer::new(modes, tx);
        let engine = self.clone();
        let thread_id = thread_id.to_string();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = engine
                .execute(&thread_id, start, Arc::new(config), &mux)
                .await
            {
                mux.fail(e).await;
            }
        });

        RunStream::new(rx, handle.abort_handle())
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("graph", &self.graph)
            .field("options", &self.options)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}
