//! Completion service seam
//!
//! The engine is an orchestration runtime, not an LLM client. Handlers that
//! need a model call go through a [`CompletionService`] injected into the
//! [`ExecutionEngine`](crate::ExecutionEngine) and reached via
//! [`NodeContext::complete`](crate::NodeContext::complete). There is no
//! process-wide client.
//!
//! Implementations should report transport and provider failures as
//! [`GraphError::ExternalService`](crate::GraphError::ExternalService); the
//! engine surfaces them as a failed step and never retries.
//!
//! ```rust,ignore
//! use stepgraph_core::{CompletionService, Message, RunConfig, Result};
//! use async_trait::async_trait;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl CompletionService for Echo {
//!     async fn complete(
//!         &self,
//!         _system_prompt: Option<&str>,
//!         messages: &[Message],
//!         _config: &RunConfig,
//!     ) -> Result<Message> {
//!         let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
//!         Ok(Message::assistant(last))
//!     }
//! }
//! ```

use crate::config::RunConfig;
use crate::error::Result;
use crate::messages::Message;
use async_trait::async_trait;

/// Chat-completion provider used by node handlers
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce the next assistant message for an ordered history
    ///
    /// `config` is the caller's [`RunConfig`], passed through unchanged so
    /// providers can pick up per-call model names or token limits.
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        config: &RunConfig,
    ) -> Result<Message>;
}
