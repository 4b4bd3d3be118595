//! Error types for graph definition and execution
//!
//! [`GraphError`] covers the whole lifecycle of a graph:
//!
//! | Variant | When | Thread state afterwards |
//! |---------|------|-------------------------|
//! | `GraphDefinition` | building / compiling a graph | no run happened |
//! | `HandlerExecution` | a node handler failed | last persisted checkpoint |
//! | `ExternalService` | the completion service failed inside a node | last persisted checkpoint |
//! | `Persistence` | the checkpoint store failed | last persisted checkpoint |
//! | `ResumeMismatch` | resume on a thread with no pending interrupt | unchanged |
//! | `ThreadBusy` | another call on the same thread is in flight | unchanged |
//! | `PendingInterrupt` | new input sent to a suspended thread | unchanged |
//!
//! Nothing is retried by the engine; callers decide.

use stepgraph_checkpoint::CheckpointError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    /// Invalid graph structure, detected before any run
    #[error("Graph definition error: {0}")]
    GraphDefinition(String),

    /// A node handler failed; the step was aborted and nothing was persisted
    #[error("Node '{node}' execution failed: {error}")]
    HandlerExecution { node: String, error: String },

    /// The external completion service failed
    #[error("External service error: {0}")]
    ExternalService(String),

    /// The checkpoint store failed; the step was not persisted
    #[error("Persistence error: {0}")]
    Persistence(#[from] CheckpointError),

    /// Resume targeted a thread that is not waiting on an interrupt
    #[error("Cannot resume thread '{thread_id}': {reason}")]
    ResumeMismatch { thread_id: String, reason: String },

    /// A run or resume for this thread is already in flight
    #[error("Thread '{thread_id}' is busy with another run")]
    ThreadBusy { thread_id: String },

    /// New input was sent to a thread that is waiting on a resume value
    #[error("Thread '{thread_id}' is suspended at node '{node}' and must be resumed")]
    PendingInterrupt { thread_id: String, node: String },

    /// The run executed more steps than allowed
    #[error("Recursion limit of {limit} steps reached without hitting a terminal node")]
    RecursionLimit { limit: usize },

    #[error("State error: {0}")]
    State(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    pub fn definition(message: impl Into<String>) -> Self {
        Self::GraphDefinition(message.into())
    }

    pub fn handler(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::HandlerExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalService(message.into())
    }

    pub fn resume_mismatch(thread_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResumeMismatch {
            thread_id: thread_id.into(),
            reason: reason.into(),
        }
    }

    /// Attribute an error raised inside a handler to its node
    ///
    /// Completion-service and persistence failures keep their own variant so
    /// callers can tell them apart; anything else becomes `HandlerExecution`.
    pub(crate) fn in_node(self, node: &str) -> Self {
        match self {
            e @ (GraphError::ExternalService(_)
            | GraphError::HandlerExecution { .. }
            | GraphError::Persistence(_)) => e,
            other => GraphError::handler(node, other.to_string()),
        }
    }
}
