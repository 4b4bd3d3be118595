//! # stepgraph-cli
//!
//! A console agent that asks for confirmation before answering, with every
//! step checkpointed to SQLite so a conversation can be abandoned at the
//! confirmation prompt and picked up again in a later process.
//!
//! - [`agent`] - the `router → confirm → answer` graph
//! - [`openai`] - completion service for OpenAI-compatible endpoints
//! - [`session`] - turn-level façade used by the REPL

pub mod agent;
pub mod openai;
pub mod session;

pub use agent::build_agent;
pub use openai::{OpenAiCompatClient, OpenAiSettings};
pub use session::{ChatSession, Turn};
