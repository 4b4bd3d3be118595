//! Single-writer-per-thread discipline
//!
//! Every run, resume and state update holds its thread's lock for its whole
//! duration. Different threads never contend; entries are dropped from the
//! map once nobody holds or waits for them.

use crate::config::ConcurrencyPolicy;
use crate::error::{GraphError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Clone, Default)]
pub(crate) struct ThreadLocks {
    locks: LockMap,
}

/// Held for the duration of one call on a thread
pub(crate) struct ThreadGuard {
    thread_id: String,
    locks: LockMap,
    _guard: OwnedMutexGuard<()>,
}

impl ThreadLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(
        &self,
        thread_id: &str,
        policy: ConcurrencyPolicy,
    ) -> Result<ThreadGuard> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(thread_id.to_string()).or_default().clone()
        };

        let guard = match policy {
            ConcurrencyPolicy::Reject => lock.try_lock_owned().map_err(|_| {
                tracing::warn!(thread_id = %thread_id, "Rejected call on busy thread");
                GraphError::ThreadBusy {
                    thread_id: thread_id.to_string(),
                }
            })?,
            ConcurrencyPolicy::Queue => {
                tracing::debug!(thread_id = %thread_id, "Waiting for thread lock");
                lock.lock_owned().await
            }
        };

        Ok(ThreadGuard {
            thread_id: thread_id.to_string(),
            locks: self.locks.clone(),
            _guard: guard,
        })
    }

    /// Threads with a call in flight or queued
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map and one inside our own guard
        let idle = map
            .get(&self.thread_id)
            .map_or(false, |lock| Arc::strong_count(lock) <= 2);
        if idle {
            map.remove(&self.thread_id);
        }
    }
}
