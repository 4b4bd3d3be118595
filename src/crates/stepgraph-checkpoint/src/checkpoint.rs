//! Core checkpoint data structures
//!
//! A [`Checkpoint`] is one immutable entry in a thread's append-only log. It
//! records the full state snapshot after a step, the frontier of nodes that
//! run next, and, when the thread is suspended, the [`PendingInterrupt`]
//! awaiting a resume value.
//!
//! # Layout
//!
//! ```text
//! thread "support-42"
//!   ├─ seq 0  source=input   next=[router]
//!   ├─ seq 1  source=loop    next=[confirm]        node=router
//!   ├─ seq 2  source=loop    next=[confirm]        node=confirm  interrupt{confirm, "answer now?"}
//!   └─ seq 3  source=resume  next=[]               node=confirm
//! ```
//!
//! Sequence numbers start at zero and grow by exactly one per append. The
//! latest entry is the thread's current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Origin of a checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Written when a run accepts new input, before any node executes
    Input,
    /// Written after a node completes inside the step loop
    Loop,
    /// Written after the post-interrupt half of a node completes
    Resume,
    /// Written by a manual state update outside of a run
    Update,
}

impl std::fmt::Display for CheckpointSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckpointSource::Input => "input",
            CheckpointSource::Loop => "loop",
            CheckpointSource::Resume => "resume",
            CheckpointSource::Update => "update",
        };
        f.write_str(s)
    }
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Step counter within the run that wrote it
    /// -1 for the input checkpoint, 0.. for loop checkpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,

    /// Node whose completion produced this checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    /// Create a new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the step number
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Set the producing node
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A suspension point waiting for an externally supplied value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingInterrupt {
    /// Node that raised the interrupt and will receive the resume value
    pub node_id: String,

    /// Payload surfaced to the caller (e.g. a question)
    pub payload: Value,

    /// Nodes that were queued behind the interrupted node; restored on resume
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deferred: Vec<String>,
}

impl PendingInterrupt {
    pub fn new(node_id: impl Into<String>, payload: Value) -> Self {
        Self {
            node_id: node_id.into(),
            payload,
            deferred: Vec::new(),
        }
    }

    pub fn with_deferred(mut self, deferred: Vec<String>) -> Self {
        self.deferred = deferred;
        self
    }
}

/// Immutable snapshot of a thread after a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// Globally unique checkpoint ID
    pub id: CheckpointId,

    /// Owning thread
    pub thread_id: String,

    /// Position in the thread's log, starting at zero
    pub sequence: u64,

    /// Creation time
    pub ts: DateTime<Utc>,

    /// Serialized state snapshot
    pub values: Map<String, Value>,

    /// Nodes to run next; empty when the thread is terminal
    pub next: Vec<String>,

    /// Set while the thread is suspended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<PendingInterrupt>,

    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a checkpoint at an explicit position in a thread's log
    pub fn new(thread_id: impl Into<String>, sequence: u64, values: Map<String, Value>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            sequence,
            ts: Utc::now(),
            values,
            next: Vec::new(),
            pending_interrupt: None,
            metadata: CheckpointMetadata::default(),
        }
    }

    /// Create the first checkpoint of a thread
    pub fn first(thread_id: impl Into<String>, values: Map<String, Value>) -> Self {
        Self::new(thread_id, 0, values)
    }

    /// Create the checkpoint that directly follows this one
    pub fn successor(&self, values: Map<String, Value>) -> Self {
        Self::new(self.thread_id.clone(), self.sequence + 1, values)
    }

    /// Set the frontier
    pub fn with_next(mut self, next: Vec<String>) -> Self {
        self.next = next;
        self
    }

    /// Mark the checkpoint as suspended
    pub fn with_interrupt(mut self, interrupt: PendingInterrupt) -> Self {
        self.pending_interrupt = Some(interrupt);
        self
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// True when nothing remains to run and nothing is awaited
    pub fn is_terminal(&self) -> bool {
        self.next.is_empty() && self.pending_interrupt.is_none()
    }

    /// True while a resume value is awaited
    pub fn is_interrupted(&self) -> bool {
        self.pending_interrupt.is_some()
    }
}
