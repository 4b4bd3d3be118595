//! Streaming of run progress
//!
//! A streamed run emits [`StreamEvent`]s as it goes. Which events are sent is
//! chosen with [`StreamMode`]s:
//!
//! | Mode | Events | Emitted |
//! |------|--------|---------|
//! | **Values** | `Values` | merged state for the input and after every persisted step |
//! | **Updates** | `Updates` | the partial state each node returned |
//! | **Checkpoints** | `Checkpoint` | sequence, source and frontier of each appended checkpoint |
//! | **Tasks** | `TaskStart` / `TaskEnd` | node boundaries |
//! | **Debug** | Checkpoints + Tasks | everything above except values/updates |
//!
//! The terminal event, [`StreamEvent::Complete`] or [`StreamEvent::Interrupt`],
//! is always the last item, whatever the modes. A failed run ends the stream
//! with an `Err` instead.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   bounded channel (stream_buffer)   ┌──────────┐
//! │  step loop   │ ──────────────────────────────────▶ │ consumer │
//! │ (tokio task) │        Result<StreamEvent>           │          │
//! └──────────────┘                                     └──────────┘
//! ```
//!
//! The loop runs in its own task. Dropping the [`RunStream`] aborts that
//! task: checkpoints already appended stand, the step in flight is lost and
//! the thread stays resumable from its last checkpoint.

use crate::error::{GraphError, Result};
use crate::graph::NodeId;
use crate::state::State;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::pin::Pin;
use std::task::{Context, Poll};
use stepgraph_checkpoint::CheckpointSource;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::ReceiverStream;

/// Selects which events a streamed run emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Full state after each persisted step
    Values,
    /// Partial state produced by each node
    Updates,
    /// Checkpoint appends
    Checkpoints,
    /// Node start / end
    Tasks,
    /// Checkpoints and Tasks combined
    Debug,
}

/// One item of a run stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Merged thread state after the checkpoint `sequence` was written
    Values { sequence: u64, state: State },

    /// What `node` returned, before merging
    Updates { node: NodeId, update: State },

    /// A checkpoint was appended
    Checkpoint {
        sequence: u64,
        source: CheckpointSource,
        next: Vec<NodeId>,
        interrupted: bool,
    },

    /// A node (or the post-interrupt half of one) is about to run
    TaskStart {
        node: NodeId,
        step: usize,
        resumed: bool,
    },

    /// A node finished; `result` is `update`, `route` or `interrupt`
    TaskEnd {
        node: NodeId,
        step: usize,
        result: String,
    },

    /// Terminal: the thread is suspended at `node`
    Interrupt {
        node: NodeId,
        payload: Value,
        state: State,
    },

    /// Terminal: the thread reached the end of the graph
    Complete { state: State },
}

impl StreamEvent {
    /// Mode that enables this event; `None` for terminal events
    pub fn mode(&self) -> Option<StreamMode> {
        match self {
            StreamEvent::Values { .. } => Some(StreamMode::Values),
            StreamEvent::Updates { .. } => Some(StreamMode::Updates),
            StreamEvent::Checkpoint { .. } => Some(StreamMode::Checkpoints),
            StreamEvent::TaskStart { .. } | StreamEvent::TaskEnd { .. } => Some(StreamMode::Tasks),
            StreamEvent::Interrupt { .. } | StreamEvent::Complete { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.mode().is_none()
    }
}

/// Mode filter in front of the stream channel
///
/// Without a sender (plain `run`/`resume`) every emit is a no-op.
pub(crate) struct StreamMultiplexer {
    modes: HashSet<StreamMode>,
    tx: Option<mpsc::Sender<Result<StreamEvent>>>,
}

impl StreamMultiplexer {
    /// Debug mode is expanded to Tasks + Checkpoints
    pub(crate) fn new(modes: &[StreamMode], tx: mpsc::Sender<Result<StreamEvent>>) -> Self {
        let mut expanded: HashSet<StreamMode> = modes.iter().copied().collect();
        if expanded.contains(&StreamMode::Debug) {
            expanded.insert(StreamMode::Tasks);
            expanded.insert(StreamMode::Checkpoints);
        }

        Self {
            modes: expanded,
            tx: Some(tx),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self {
            modes: HashSet::new(),
            tx: None,
        }
    }

    pub(crate) fn has_mode(&self, mode: StreamMode) -> bool {
        self.tx.is_some() && self.modes.contains(&mode)
    }

    /// Send an event if its mode is enabled; terminal events always pass
    pub(crate) async fn emit(&self, event: StreamEvent) {
        let Some(tx) = &self.tx else { return };

        let enabled = event.mode().map_or(true, |mode| self.modes.contains(&mode));
        if enabled && tx.send(Ok(event)).await.is_err() {
            tracing::debug!("Stream consumer dropped, event discarded");
        }
    }

    pub(crate) async fn fail(&self, error: GraphError) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(error)).await;
        }
    }
}

/// Events of a streamed run
///
/// Dropping the stream cancels the run.
pub struct RunStream {
    inner: ReceiverStream<Result<StreamEvent>>,
    task: AbortHandle,
}

impl RunStream {
    pub(crate) fn new(rx: mpsc::Receiver<Result<StreamEvent>>, task: AbortHandle) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            task,
        }
    }

    /// Drain the stream and return its terminal event
    pub async fn finish(mut self) -> Result<StreamEvent> {
        use futures::StreamExt;

        while let Some(item) = self.next().await {
            let event = item?;
            if event.is_terminal() {
                return Ok(event);
            }
        }

        Err(GraphError::State(
            "run stream ended without a terminal event".to_string(),
        ))
    }
}

impl Stream for RunStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for RunStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStream").finish_non_exhaustive()
    }
}
