//! # stepgraph-checkpoint - Durable checkpoint log for graph execution
//!
//! Checkpoints are **immutable snapshots** written by the execution engine
//! after every completed node. Each thread owns an append-only log of them;
//! the last entry is the thread's current state. They enable:
//!
//! - **Durable pause/resume** - a suspended thread carries its
//!   [`PendingInterrupt`] across process restarts
//! - **Crash recovery** - a step that was not persisted simply never happened
//! - **History inspection** - every intermediate state stays readable
//!
//! ## Core Concepts
//!
//! - [`Checkpoint`] - state snapshot, frontier (`next`), optional interrupt,
//!   [`CheckpointMetadata`]
//! - [`CheckpointStore`] - `append` / `get_latest` / `get_all` contract
//! - [`InMemoryCheckpointStore`] - reference backend for tests and demos
//! - [`SqliteCheckpointStore`] - durable backend (WAL, `synchronous = FULL`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stepgraph_checkpoint::{Checkpoint, CheckpointStore, SqliteCheckpointStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteCheckpointStore::open("checkpoints.sqlite").await?;
//!
//!     let first = Checkpoint::first("thread-123", Default::default());
//!     store.append("thread-123", first.clone()).await?;
//!     store.append("thread-123", first.successor(Default::default())).await?;
//!
//!     let latest = store.get_latest("thread-123").await?;
//!     println!("current sequence: {:?}", latest.map(|c| c.sequence));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        stepgraph-core (ExecutionEngine)     │
//! │  run node → merge state → append checkpoint │
//! └──────────────────────┬──────────────────────┘
//!                        │ CheckpointStore trait
//!           ┌────────────┴────────────┐
//!           ▼                         ▼
//!   ┌───────────────┐        ┌─────────────────┐
//!   │   In-Memory   │        │     SQLite      │
//!   │ (tests, demo) │        │   (durable)     │
//!   └───────────────┘        └─────────────────┘
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod sqlite;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, PendingInterrupt,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use sqlite::SqliteCheckpointStore;
pub use traits::{validate_append, CheckpointStore, CheckpointStream};
