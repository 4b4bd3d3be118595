//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointStore`] keeps every thread's log in a
//! `Arc<RwLock<HashMap<thread_id, Vec<Checkpoint>>>>`. Appends validate and
//! push under a single write guard, so readers see either the old log or the
//! new one, never a partial entry.
//!
//! Data is lost when the process exits; use
//! [`SqliteCheckpointStore`](crate::SqliteCheckpointStore) when threads must
//! survive a restart.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Arc<RwLock<HashMap>>                       │
//! │    "session-1" → [seq 0, seq 1, seq 2]      │
//! │    "session-2" → [seq 0]                    │
//! └─────────────────────────────────────────────┘
//! ```

use crate::{
    checkpoint::Checkpoint,
    error::Result,
    traits::{validate_append, CheckpointStore},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>;

/// In-memory checkpoint store
///
/// Cloning is cheap and every clone shares the same storage.
///
/// # Example
///
/// ```rust
/// use stepgraph_checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryCheckpointStore::new();
///     store
///         .append("thread-1", Checkpoint::first("thread-1", Default::default()))
///         .await?;
///
///     let latest = store.get_latest("thread-1").await?;
///     assert_eq!(latest.map(|c| c.sequence), Some(0));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointStore {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointStore {
    /// Create a new in-memory checkpoint store
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn append(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()> {
        let mut storage = self.storage.write().await;
        let entries = storage.entry(thread_id.to_string()).or_default();

        validate_append(thread_id, entries.last().map(|c| c.sequence), &checkpoint)?;
        entries.push(checkpoint);

        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(thread_id).and_then(|entries| entries.last().cloned()))
    }

    async fn get_all(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(thread_id).cloned().unwrap_or_default())
    }

    async fn get(&self, thread_id: &str, sequence: u64) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.get(sequence as usize).cloned()))
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let storage = self.storage.read().await;
        let mut threads: Vec<String> = storage
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        threads.sort();
        Ok(threads)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.remove(thread_id);
        Ok(())
    }
}
