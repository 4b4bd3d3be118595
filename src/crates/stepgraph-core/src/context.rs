//! Per-invocation context handed to node handlers

use crate::completion::CompletionService;
use crate::config::RunConfig;
use crate::error::{GraphError, Result};
use crate::graph::NodeId;
use crate::messages::Message;
use serde_json::Value;
use std::sync::Arc;

/// What a handler knows about the call it is running in
#[derive(Clone)]
pub struct NodeContext {
    thread_id: String,
    node: NodeId,
    step: usize,
    config: Arc<RunConfig>,
    completion: Option<Arc<dyn CompletionService>>,
}

impl NodeContext {
    pub(crate) fn new(
        thread_id: impl Into<String>,
        node: impl Into<NodeId>,
        step: usize,
        config: Arc<RunConfig>,
        completion: Option<Arc<dyn CompletionService>>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            node: node.into(),
            step,
            config,
            completion,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Node currently executing
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Zero-based step counter within the current call
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The injected completion service
    pub fn completion(&self) -> Result<&Arc<dyn CompletionService>> {
        self.completion
            .as_ref()
            .ok_or_else(|| GraphError::external("no completion service configured"))
    }

    /// Call the completion service with this call's [`RunConfig`]
    pub async fn complete(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
    ) -> Result<Message> {
        self.completion()?
            .complete(system_prompt, messages, &self.config)
            .await
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("thread_id", &self.thread_id)
            .field("node", &self.node)
            .field("step", &self.step)
            .field("config", &self.config)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

/// Input of a post-interrupt handler
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeInput {
    /// Payload the pre-interrupt half surfaced to the caller
    pub payload: Value,

    /// Value supplied by the caller on resume
    pub value: Value,
}

impl ResumeInput {
    /// The resume value as a trimmed string, if it is one
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str().map(str::trim)
    }
}
