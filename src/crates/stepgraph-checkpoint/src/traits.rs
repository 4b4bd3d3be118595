//! Checkpoint storage trait for pluggable backends
//!
//! [`CheckpointStore`] is the only shared, mutable resource of the engine.
//! Every backend keeps one append-only log per thread and must honour:
//!
//! - **Atomic append** - a reader never observes a partially written checkpoint
//! - **Monotonic sequence** - an append must carry `latest.sequence + 1`
//!   (or `0` for a new thread); anything else is a [`CheckpointError::Conflict`]
//! - **Isolation** - reads of one thread never wait on writes to another
//!
//! The conflict check means two writers racing on the same thread can never
//! fork its history: exactly one of them wins the next sequence number.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use stepgraph_checkpoint::{Checkpoint, CheckpointStore, Result};
//! use async_trait::async_trait;
//!
//! struct RedisStore { /* ... */ }
//!
//! #[async_trait]
//! impl CheckpointStore for RedisStore {
//!     async fn append(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()> {
//!         // WATCH the thread key, verify the sequence, MULTI/EXEC the push
//!         todo!()
//!     }
//!
//!     async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
//!         todo!()
//!     }
//!
//!     async fn get_all(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
//!         todo!()
//!     }
//!
//!     async fn list_threads(&self) -> Result<Vec<String>> {
//!         todo!()
//!     }
//! }
//! ```

use crate::{
    checkpoint::Checkpoint,
    error::{CheckpointError, Result},
};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::pin::Pin;

/// Type alias for async stream of checkpoints
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send + 'static>>;

/// Durable, append-only checkpoint log keyed by thread
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint to the end of a thread's log
    async fn append(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()>;

    /// Latest checkpoint of a thread, `None` for an unknown thread
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Every checkpoint of a thread in ascending sequence order
    async fn get_all(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;

    /// All known thread ids
    async fn list_threads(&self) -> Result<Vec<String>>;

    /// A single checkpoint by sequence number
    async fn get(&self, thread_id: &str, sequence: u64) -> Result<Option<Checkpoint>> {
        Ok(self
            .get_all(thread_id)
            .await?
            .into_iter()
            .find(|c| c.sequence == sequence))
    }

    /// Stream a thread's checkpoints newest first
    ///
    /// `before` keeps only sequences strictly lower than the given one.
    async fn list(
        &self,
        thread_id: &str,
        before: Option<u64>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let mut entries = self.get_all(thread_id).await?;
        entries.reverse();

        let results: Vec<Result<Checkpoint>> = entries
            .into_iter()
            .filter(|c| before.map_or(true, |b| c.sequence < b))
            .take(limit.unwrap_or(usize::MAX))
            .map(Ok)
            .collect();

        Ok(Box::pin(stream::iter(results)))
    }

    /// Remove a thread and its whole log
    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _ = thread_id;
        Ok(())
    }
}

/// Check that `checkpoint` may be appended after `latest_sequence`
pub fn validate_append(
    thread_id: &str,
    latest_sequence: Option<u64>,
    checkpoint: &Checkpoint,
) -> Result<()> {
    if checkpoint.thread_id != thread_id {
        return Err(CheckpointError::Invalid(format!(
            "checkpoint belongs to thread '{}', not '{}'",
            checkpoint.thread_id, thread_id
        )));
    }

    let expected = latest_sequence.map_or(0, |s| s + 1);
    if checkpoint.sequence != expected {
        return Err(CheckpointError::conflict(
            thread_id,
            expected,
            checkpoint.sequence,
        ));
    }

    Ok(())
}
