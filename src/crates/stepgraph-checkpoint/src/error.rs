//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Append rejected because it would not extend the thread's log by exactly one entry
    #[error("Checkpoint conflict on thread '{thread_id}': expected sequence {expected}, got {actual}")]
    Conflict {
        thread_id: String,
        expected: u64,
        actual: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    pub fn conflict(thread_id: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            thread_id: thread_id.into(),
            expected,
            actual,
        }
    }
}
