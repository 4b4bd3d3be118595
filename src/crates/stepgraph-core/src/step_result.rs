//! Node execution result types
//!
//! Every handler returns a [`StepResult`]. The engine matches it
//! exhaustively:
//!
//! - [`StepResult::Update`] merges a partial state and follows the node's
//!   static edge
//! - [`StepResult::Route`] merges a partial state and jumps to explicit
//!   targets, overriding static edges for this step
//! - [`StepResult::Interrupt`] merges a partial state and suspends the thread
//!   with a payload for the caller
//!
//! # Example
//!
//! ```rust
//! use stepgraph_core::{Message, State, StepResult, END};
//! use serde_json::json;
//!
//! // Plain update
//! let r = StepResult::update(State::from_message(Message::assistant("done")));
//! assert!(r.goto().is_none());
//!
//! // Jump straight to the end with a reply
//! let r = StepResult::route(END).with_update(State::from_message(Message::assistant("bye")));
//! assert_eq!(r.goto(), Some(&[END.to_string()][..]));
//!
//! // Ask the caller something
//! let r = StepResult::interrupt(json!("answer now? yes/no"));
//! assert!(r.is_interrupt());
//! ```

use crate::graph::NodeId;
use crate::state::State;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Partial state merged into the thread, then follow the static edge
    Update(State),

    /// Partial state merged, then continue at exactly these nodes
    Route { update: State, goto: Vec<NodeId> },

    /// Partial state merged, then suspend waiting for a resume value
    Interrupt { update: State, payload: Value },
}

impl StepResult {
    pub fn update(update: impl Into<State>) -> Self {
        StepResult::Update(update.into())
    }

    /// Route to a single node (or [`END`](crate::END)) with no state change
    pub fn route(target: impl Into<NodeId>) -> Self {
        StepResult::Route {
            update: State::new(),
            goto: vec![target.into()],
        }
    }

    /// Route to several nodes; they are queued and run one per step
    pub fn route_many<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        StepResult::Route {
            update: State::new(),
            goto: targets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn interrupt(payload: impl Into<Value>) -> Self {
        StepResult::Interrupt {
            update: State::new(),
            payload: payload.into(),
        }
    }

    /// Replace the partial state carried by this result
    pub fn with_update(self, update: impl Into<State>) -> Self {
        let update = update.into();
        match self {
            StepResult::Update(_) => StepResult::Update(update),
            StepResult::Route { goto, .. } => StepResult::Route { update, goto },
            StepResult::Interrupt { payload, .. } => StepResult::Interrupt { update, payload },
        }
    }

    /// The partial state carried by this result
    pub fn state_update(&self) -> &State {
        match self {
            StepResult::Update(update)
            | StepResult::Route { update, .. }
            | StepResult::Interrupt { update, .. } => update,
        }
    }

    pub fn goto(&self) -> Option<&[NodeId]> {
        match self {
            StepResult::Route { goto, .. } => Some(goto),
            _ => None,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, StepResult::Interrupt { .. })
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            StepResult::Update(_) => "update",
            StepResult::Route { .. } => "route",
            StepResult::Interrupt { .. } => "interrupt",
        }
    }
}

impl From<State> for StepResult {
    fn from(update: State) -> Self {
        StepResult::Update(update)
    }
}
