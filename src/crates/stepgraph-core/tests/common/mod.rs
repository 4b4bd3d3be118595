//! Shared fixtures for the integration suites
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use stepgraph_checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use stepgraph_core::{
    CompiledGraph, CompletionService, ExecutionEngine, GraphError, GraphSpec, Message, RunConfig,
    State, StepResult, END, START,
};

pub const CONFIRM_PROMPT: &str = "answer now? yes/no";
pub const DECLINE: &str = "OK, I won't answer for now.";
pub const SYSTEM_PROMPT: &str = "You are a concise assistant.";

/// Completion service that records every call and answers with a fixed reply
#[derive(Default)]
pub struct RecordingCompletion {
    calls: Mutex<Vec<(Option<String>, Vec<Message>)>>,
    fail: bool,
}

impl RecordingCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(Option<String>, Vec<Message>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for RecordingCompletion {
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        _config: &RunConfig,
    ) -> stepgraph_core::Result<Message> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.map(str::to_string), messages.to_vec()));

        if self.fail {
            return Err(GraphError::external("upstream returned 503"));
        }
        Ok(Message::assistant(format!("reply #{}", messages.len())))
    }
}

/// `router → confirm → answer`, the conversational agent used across suites
pub fn agent_graph() -> CompiledGraph {
    let mut spec = GraphSpec::new();

    spec.add_node("router", |state: State, _ctx| async move {
        let asked = state
            .last_message()
            .map_or(false, |m| m.is_human() && !m.text().trim().is_empty());
        Ok(if asked {
            StepResult::route("confirm")
        } else {
            StepResult::route(END).with_update(Message::assistant("Please enter a question first."))
        })
    })
    .unwrap();
    spec.add_routes("router", ["confirm", END]).unwrap();

    spec.add_interruptible_node(
        "confirm",
        |_state, _ctx| async move { Ok(StepResult::interrupt(CONFIRM_PROMPT)) },
        |_state, input, _ctx| async move {
            let yes = matches!(
                input.as_str().map(str::to_lowercase).as_deref(),
                Some("yes") | Some("y")
            );
            Ok(if yes {
                StepResult::route("answer")
            } else {
                StepResult::route(END).with_update(Message::assistant(DECLINE))
            })
        },
    )
    .unwrap();
    spec.add_routes("confirm", ["answer", END]).unwrap();

    spec.add_node("answer", |state: State, ctx| async move {
        let reply = ctx.complete(Some(SYSTEM_PROMPT), &state.messages).await?;
        Ok(StepResult::update(reply))
    })
    .unwrap();

    spec.add_edge(START, "router").unwrap();
    spec.add_edge("answer", END).unwrap();
    spec.compile().unwrap()
}

pub fn agent_engine(
    store: Arc<dyn CheckpointStore>,
    completion: Arc<RecordingCompletion>,
) -> ExecutionEngine {
    ExecutionEngine::new(agent_graph(), store).with_completion(completion)
}

pub fn memory_engine() -> (ExecutionEngine, Arc<InMemoryCheckpointStore>, Arc<RecordingCompletion>) {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let completion = RecordingCompletion::new();
    let engine = agent_engine(store.clone(), completion.clone());
    (engine, store, completion)
}

pub fn human(text: &str) -> State {
    State::from_message(Message::human(text))
}

pub fn texts(state: &State) -> Vec<String> {
    state.messages.iter().map(|m| m.content.clone()).collect()
}
