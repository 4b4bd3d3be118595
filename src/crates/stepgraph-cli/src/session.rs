//! Turn-level façade over the engine for one conversation thread

use crate::agent::CONFIRM_PROMPT;
use futures::StreamExt;
use stepgraph_core::{
    ExecutionEngine, GraphError, Message, Result, RunConfig, RunOutcome, RunStream, State,
    StateSnapshot, StreamEvent, StreamMode,
};

/// Where a conversation stands after a call
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// The agent is waiting for a yes/no; the string is its prompt
    AwaitingConfirmation(String),
    /// The turn is over; latest assistant reply, if any
    Finished(Option<String>),
}

/// One conversation thread driven turn by turn
pub struct ChatSession {
    engine: ExecutionEngine,
    thread_id: String,
    config: RunConfig,
}

impl ChatSession {
    pub fn new(engine: ExecutionEngine, thread_id: impl Into<String>) -> Self {
        Self {
            engine,
            thread_id: thread_id.into(),
            config: RunConfig::new(),
        }
    }

    /// Forward `config` to every node of every run
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Prompt of the confirmation a previous process left unanswered
    pub async fn pending_confirmation(&self) -> Result<Option<String>> {
        let snapshot = self.engine.get_state(&self.thread_id).await?;
        Ok(snapshot
            .and_then(|s| s.pending_interrupt)
            .map(|interrupt| prompt_text(&interrupt.payload)))
    }

    /// Nodes a failed or aborted run left scheduled, when no confirmation is pending
    pub async fn unfinished_steps(&self) -> Result<Option<Vec<String>>> {
        Ok(self
            .snapshot()
            .await?
            .filter(|s| s.pending_interrupt.is_none() && !s.next.is_empty())
            .map(|s| s.next))
    }

    /// Conversation so far
    pub async fn history(&self) -> Result<Vec<Message>> {
        Ok(self
            .snapshot()
            .await?
            .map(|s| s.state.messages)
            .unwrap_or_default())
    }

    pub async fn snapshot(&self) -> Result<Option<StateSnapshot>> {
        self.engine.get_state(&self.thread_id).await
    }

    /// Append `question` to the conversation and run until the agent
    /// stops for confirmation or finishes
    #[tracing::instrument(skip(self, question), fields(thread_id = %self.thread_id))]
    pub async fn ask(&self, question: &str) -> Result<Turn> {
        let input = State::from_message(Message::human(question));
        let stream = self
            .engine
            .stream(&self.thread_id, input, self.config.clone(), &[StreamMode::Values])
            .await?;
        self.drive(stream).await
    }

    /// Run the steps an earlier run left unfinished, without new input
    #[tracing::instrument(skip(self), fields(thread_id = %self.thread_id))]
    pub async fn continue_run(&self) -> Result<Turn> {
        let stream = self
            .engine
            .stream(&self.thread_id, State::new(), self.config.clone(), &[StreamMode::Values])
            .await?;
        self.drive(stream).await
    }

    /// Answer the pending confirmation with `decision`
    #[tracing::instrument(skip(self), fields(thread_id = %self.thread_id))]
    pub async fn decide(&self, decision: &str) -> Result<Turn> {
        let stream = self
            .engine
            .stream_resume(
                &self.thread_id,
                decision.trim(),
                self.config.clone(),
                &[StreamMode::Values],
            )
            .await?;
        self.drive(stream).await
    }

    async fn drive(&self, mut stream: RunStream) -> Result<Turn> {
        while let Some(item) = stream.next().await {
            match item? {
                StreamEvent::Values { sequence, state } => {
                    tracing::debug!(sequence, messages = state.messages.len(), "State advanced");
                }
                event if event.is_terminal() => {
                    return RunOutcome::from_event(event)
                        .map(turn_from_outcome)
                        .ok_or_else(|| GraphError::State("unexpected terminal event".to_string()));
                }
                _ => {}
            }
        }

        Err(GraphError::State(
            "run stream ended without a terminal event".to_string(),
        ))
    }
}

fn turn_from_outcome(outcome: RunOutcome) -> Turn {
    match outcome {
        RunOutcome::Interrupted { payload, .. } => Turn::AwaitingConfirmation(prompt_text(&payload)),
        RunOutcome::Complete(state) => Turn::Finished(
            state
                .messages
                .iter()
                .rev()
                .find(|m| m.is_assistant())
                .map(|m| m.content.clone()),
        ),
    }
}

fn prompt_text(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => CONFIRM_PROMPT.to_string(),
        other => other.to_string(),
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}
