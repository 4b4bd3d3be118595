//! Thread inspection and manual state updates

use super::{ExecutionEngine, StateSnapshot};
use crate::error::Result;
use crate::state::State;
use futures::TryStreamExt;
use stepgraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource};

impl ExecutionEngine {
    /// Current state of a thread, `None` if it has never run
    ///
    /// Reads do not take the thread lock.
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        self.store
            .get_latest(thread_id)
            .await?
            .map(StateSnapshot::from_checkpoint)
            .transpose()
    }

    /// Past states of a thread, newest first
    pub async fn get_state_history(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StateSnapshot>> {
        let checkpoints: Vec<Checkpoint> = self
            .store
            .list(thread_id, None, limit)
            .await?
            .try_collect()
            .await?;

        checkpoints
            .into_iter()
            .map(StateSnapshot::from_checkpoint)
            .collect()
    }

    /// Merge `update` into a thread's state outside of a run
    ///
    /// Appends a checkpoint with source `update` that keeps the frontier and
    /// any pending interrupt as they were, so a suspended thread stays
    /// suspended.
    #[tracing::instrument(skip(self, update), fields(thread_id = %thread_id))]
    pub async fn update_state(&self, thread_id: &str, update: State) -> Result<StateSnapshot> {
        let _guard = self.lock(thread_id).await?;

        let latest = self.store.get_latest(thread_id).await?;
        let mut state = match &latest {
            Some(latest) => State::from_values(latest.values.clone())?,
            None => State::new(),
        };
        state.merge(update);

        let values = state.to_values()?;
        let mut checkpoint = match &latest {
            Some(latest) => {
                let mut next = latest.successor(values).with_next(latest.next.clone());
                next.pending_interrupt = latest.pending_interrupt.clone();
                next
            }
            None => Checkpoint::first(thread_id, values),
        };
        checkpoint.metadata = CheckpointMetadata::new().with_source(CheckpointSource::Update);

        self.store.append(thread_id, checkpoint.clone()).await?;
        tracing::info!(sequence = checkpoint.sequence, "State updated manually");

        StateSnapshot::from_checkpoint(checkpoint)
    }
}
