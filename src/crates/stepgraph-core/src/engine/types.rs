//! Result and snapshot types returned by the engine

use crate::error::Result;
use crate::graph::NodeId;
use crate::state::State;
use crate::stream::StreamEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use stepgraph_checkpoint::{Checkpoint, CheckpointId, CheckpointMetadata, PendingInterrupt};

/// How a run or resume call ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The frontier emptied; `State` is the final state
    Complete(State),

    /// The thread is suspended at `node` until resumed
    Interrupted {
        node: NodeId,
        payload: Value,
        state: State,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &State {
        match self {
            RunOutcome::Complete(state) | RunOutcome::Interrupted { state, .. } => state,
        }
    }

    pub fn into_state(self) -> State {
        match self {
            RunOutcome::Complete(state) | RunOutcome::Interrupted { state, .. } => state,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunOutcome::Interrupted { .. })
    }

    /// Suspended node and its payload
    pub fn interrupt(&self) -> Option<(&str, &Value)> {
        match self {
            RunOutcome::Interrupted { node, payload, .. } => Some((node, payload)),
            RunOutcome::Complete(_) => None,
        }
    }

    pub(crate) fn to_event(&self) -> StreamEvent {
        match self {
            RunOutcome::Complete(state) => StreamEvent::Complete {
                state: state.clone(),
            },
            RunOutcome::Interrupted {
                node,
                payload,
                state,
            } => StreamEvent::Interrupt {
                node: node.clone(),
                payload: payload.clone(),
                state: state.clone(),
            },
        }
    }

    /// Convert a terminal stream event; `None` for any other event
    pub fn from_event(event: StreamEvent) -> Option<Self> {
        match event {
            StreamEvent::Complete { state } => Some(RunOutcome::Complete(state)),
            StreamEvent::Interrupt {
                node,
                payload,
                state,
            } => Some(RunOutcome::Interrupted {
                node,
                payload,
                state,
            }),
            _ => None,
        }
    }
}

/// A thread's state as of one checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub thread_id: String,
    pub checkpoint_id: CheckpointId,
    pub sequence: u64,
    pub state: State,
    /// Nodes to run next; empty when terminal
    pub next: Vec<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<PendingInterrupt>,
    pub created_at: DateTime<Utc>,
    pub metadata: CheckpointMetadata,
}

impl StateSnapshot {
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Result<Self> {
        Ok(Self {
            state: State::from_values(checkpoint.values)?,
            thread_id: checkpoint.thread_id,
            checkpoint_id: checkpoint.id,
            sequence: checkpoint.sequence,
            next: checkpoint.next,
            pending_interrupt: checkpoint.pending_interrupt,
            created_at: checkpoint.ts,
            metadata: checkpoint.metadata,
        })
    }

    pub fn is_interrupted(&self) -> bool {
        self.pending_interrupt.is_some()
    }

    /// Neither pending work nor a pending interrupt
    pub fn is_terminal(&self) -> bool {
        self.next.is_empty() && self.pending_interrupt.is_none()
    }
}
