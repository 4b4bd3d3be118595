//! Run configuration and engine options
//!
//! [`RunConfig`] is an opaque bag forwarded untouched to every handler
//! (model name, token limits, credentials, ...). The engine never reads it.
//!
//! [`EngineOptions`] tune the engine itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque per-call parameters handed to node handlers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunConfig {
    params: Map<String, Value>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl From<Map<String, Value>> for RunConfig {
    fn from(params: Map<String, Value>) -> Self {
        Self { params }
    }
}

/// What to do when a second call arrives for a thread that is already running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// Fail immediately with [`GraphError::ThreadBusy`](crate::GraphError::ThreadBusy)
    #[default]
    Reject,
    /// Wait until the in-flight call finishes, then run
    Queue,
}

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum node executions per call before failing with `RecursionLimit`
    pub recursion_limit: usize,

    /// Same-thread concurrency policy
    pub concurrency: ConcurrencyPolicy,

    /// Capacity of the bounded channel behind a run stream
    pub stream_buffer: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            recursion_limit: 25,
            concurrency: ConcurrencyPolicy::Reject,
            stream_buffer: 100,
        }
    }
}

impl EngineOptions {
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency = policy;
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }
}
