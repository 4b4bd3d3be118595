//! SQLite-backed durable checkpoint store
//!
//! Provides [`SqliteCheckpointStore`], which keeps each thread's log in a
//! single `checkpoints` table keyed by `(thread_id, sequence)`. Every append is
//! one conditional `INSERT ... SELECT` that only writes when the new row
//! extends the thread's log by exactly one entry. SQLite takes the write lock
//! at the start of that statement, so appends to different threads on
//! different pooled connections queue on the lock instead of failing with
//! `SQLITE_BUSY`.
//!
//! The database is opened in WAL mode with `synchronous = FULL`: once
//! [`append`](CheckpointStore::append) returns, the checkpoint survives a
//! process restart.

use crate::{
    checkpoint::{Checkpoint, CheckpointMetadata, PendingInterrupt},
    error::{CheckpointError, Result},
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{validate_append, CheckpointStore},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How long a writer waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SELECT_COLUMNS: &str = "thread_id, sequence, checkpoint_id, format_version, created_at, \
                              state, next, pending_interrupt, metadata";

/// Durable checkpoint store on top of a SQLite database file
#[derive(Clone, Debug)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    serializer: JsonSerializer,
}

impl SqliteCheckpointStore {
    /// Open (or create) a checkpoint database at `path` and run migrations
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_max_connections(path, 5).await
    }

    /// Open with a custom connection pool size
    pub async fn open_with_max_connections<P: AsRef<Path>>(
        path: P,
        max_connections: u32,
    ) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        debug!(path = %path.display(), "Opening checkpoint database");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            serializer: JsonSerializer::new(),
        };
        store.run_migrations().await?;

        info!(path = %path.display(), "Checkpoint database ready");
        Ok(store)
    }

    /// Private in-memory database, mainly for tests
    ///
    /// Uses a single long-lived connection since every SQLite in-memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            serializer: JsonSerializer::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Apply the embedded schema migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Checkpoint database closed");
    }

    /// Error for an append that did not extend the log
    async fn conflict(&self, thread_id: &str, actual: u64) -> CheckpointError {
        let latest: std::result::Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM checkpoints WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_one(&self.pool)
                .await;

        match latest {
            Ok(latest) => {
                CheckpointError::conflict(thread_id, latest.map_or(0, |s| s as u64 + 1), actual)
            }
            Err(e) => e.into(),
        }
    }

    fn decode(&self, row: &SqliteRow) -> Result<Checkpoint> {
        let created_at: String = row.try_get("created_at")?;
        let ts = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| CheckpointError::Invalid(format!("bad timestamp '{}': {}", created_at, e)))?
            .with_timezone(&Utc);

        let state: Vec<u8> = row.try_get("state")?;
        let next: Vec<u8> = row.try_get("next")?;
        let interrupt: Option<Vec<u8>> = row.try_get("pending_interrupt")?;
        let metadata: Vec<u8> = row.try_get("metadata")?;
        let sequence: i64 = row.try_get("sequence")?;

        let values: Map<String, Value> = self.serializer.loads_column("state", &state)?;
        let pending_interrupt: Option<PendingInterrupt> = interrupt
            .map(|bytes| self.serializer.loads_column("pending_interrupt", &bytes))
            .transpose()?;
        let metadata: CheckpointMetadata = self.serializer.loads_column("metadata", &metadata)?;

        Ok(Checkpoint {
            v: row.try_get("format_version")?,
            id: row.try_get("checkpoint_id")?,
            thread_id: row.try_get("thread_id")?,
            sequence: u64::try_from(sequence)
                .map_err(|_| CheckpointError::Invalid(format!("negative sequence {}", sequence)))?,
            ts,
            values,
            next: self.serializer.loads_column("next", &next)?,
            pending_interrupt,
            metadata,
        })
    }
}

fn to_db_sequence(sequence: u64) -> Result<i64> {
    i64::try_from(sequence)
        .map_err(|_| CheckpointError::Invalid(format!("sequence {} out of range", sequence)))
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn append(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()> {
        let state = self.serializer.dumps(&checkpoint.values)?;
        let next = self.serializer.dumps(&checkpoint.next)?;
        let interrupt = checkpoint
            .pending_interrupt
            .as_ref()
            .map(|i| self.serializer.dumps(i))
            .transpose()?;
        let metadata = self.serializer.dumps(&checkpoint.metadata)?;
        let sequence = to_db_sequence(checkpoint.sequence)?;

        // Thread identity only; the insert below checks the sequence
        validate_append(thread_id, checkpoint.sequence.checked_sub(1), &checkpoint)?;

        // One statement, so SQLite takes the write lock before reading MAX(sequence)
        let inserted = sqlx::query(
            "INSERT INTO checkpoints (thread_id, sequence, checkpoint_id, format_version,
                                      created_at, state, next, pending_interrupt, metadata)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE (SELECT COALESCE(MAX(sequence) + 1, 0) FROM checkpoints WHERE thread_id = ?) = ?",
        )
        .bind(thread_id)
        .bind(sequence)
        .bind(&checkpoint.id)
        .bind(checkpoint.v)
        .bind(checkpoint.ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .bind(state)
        .bind(next)
        .bind(interrupt)
        .bind(metadata)
        .bind(thread_id)
        .bind(sequence)
        .execute(&self.pool)
        .await;

        let affected = match inserted {
            Ok(done) => done.rows_affected(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => 0,
            Err(e) => return Err(e.into()),
        };

        if affected == 0 {
            return Err(self.conflict(thread_id, checkpoint.sequence).await);
        }

        debug!(thread_id, sequence = checkpoint.sequence, "Checkpoint appended");
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let query = format!(
            "SELECT {} FROM checkpoints WHERE thread_id = ? ORDER BY sequence DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| self.decode(&r)).transpose()
    }

    async fn get_all(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let query = format!(
            "SELECT {} FROM checkpoints WHERE thread_id = ? ORDER BY sequence ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|r| self.decode(r)).collect()
    }

    async fn get(&self, thread_id: &str, sequence: u64) -> Result<Option<Checkpoint>> {
        let query = format!(
            "SELECT {} FROM checkpoints WHERE thread_id = ? AND sequence = ?",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(thread_id)
            .bind(to_db_sequence(sequence)?)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| self.decode(&r)).transpose()
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let threads: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT thread_id FROM checkpoints ORDER BY thread_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(threads)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        info!(thread_id, "Thread deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSource;
    use serde_json::json;

    fn checkpoint(thread_id: &str, sequence: u64) -> Checkpoint {
        let mut values = Map::new();
        values.insert("messages".to_string(), json!([{"role": "human", "content": "hi"}]));
        values.insert("turn".to_string(), json!(sequence));
        Checkpoint::new(thread_id, sequence, values)
            .with_next(vec!["router".to_string()])
            .with_metadata(
                CheckpointMetadata::new()
                    .with_source(CheckpointSource::Loop)
                    .with_step(sequence as i64),
            )
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = SqliteCheckpointStore::in_memory().await.unwrap();
        let cp = checkpoint("t", 0);

        store.append("t", cp.clone()).await.unwrap();
        let latest = store.get_latest("t").await.unwrap().unwrap();

        assert_eq!(latest, cp);
    }

    #[tokio::test]
    async fn test_interrupt_is_persisted() {
        let store = SqliteCheckpointStore::in_memory().await.unwrap();
        let cp = checkpoint("t", 0)
            .with_next(vec!["confirm".to_string()])
            .with_interrupt(PendingInterrupt::new("confirm", json!("answer now? yes/no")));

        store.append("t", cp).await.unwrap();
        let latest = store.get_latest("t").await.unwrap().unwrap();

        let interrupt = latest.pending_interrupt.unwrap();
        assert_eq!(interrupt.node_id, "confirm");
        assert_eq!(interrupt.payload, json!("answer now? yes/no"));
    }

    #[tokio::test]
    async fn test_sequence_conflict_is_rejected() {
        let store = SqliteCheckpointStore::in_memory().await.unwrap();
        store.append("t", checkpoint("t", 0)).await.unwrap();
        store.append("t", checkpoint("t", 1)).await.unwrap();

        let err = store.append("t", checkpoint("t", 1)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Conflict { expected: 2, actual: 1, .. }));
        assert_eq!(store.get_all("t").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_threads_and_lookup() {
        let store = SqliteCheckpointStore::in_memory().await.unwrap();
        for seq in 0..3 {
            store.append("b", checkpoint("b", seq)).await.unwrap();
        }
        store.append("a", checkpoint("a", 0)).await.unwrap();

        assert_eq!(store.list_threads().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.get("b", 1).await.unwrap().unwrap().values["turn"], json!(1));

        let sequences: Vec<u64> = store
            .get_all("b")
            .await
            .unwrap()
            .iter()
            .map(|c| c.sequence)
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);

        store.delete_thread("b").await.unwrap();
        assert!(store.get_latest("b").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_to_different_threads() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCheckpointStore::open(dir.path().join("checkpoints.sqlite"))
            .await
            .unwrap();

        let writers: Vec<_> = (0..16)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    let thread_id = format!("thread-{}", n);
                    for seq in 0..20 {
                        store.append(&thread_id, checkpoint(&thread_id, seq)).await?;
                    }
                    Ok::<_, CheckpointError>(())
                })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        assert_eq!(store.list_threads().await.unwrap().len(), 16);
        for n in 0..16 {
            let latest = store.get_latest(&format!("thread-{}", n)).await.unwrap().unwrap();
            assert_eq!(latest.sequence, 19);
        }
        store.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_appends_to_one_thread_keep_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCheckpointStore::open(dir.path().join("checkpoints.sqlite"))
            .await
            .unwrap();
        store.append("t", checkpoint("t", 0)).await.unwrap();

        let racers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.append("t", checkpoint("t", 1)).await })
            })
            .collect();

        let mut won = 0;
        for racer in racers {
            match racer.await.unwrap() {
                Ok(()) => won += 1,
                Err(CheckpointError::Conflict { expected: 2, actual: 1, .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(won, 1);
        assert_eq!(store.get_all("t").await.unwrap().len(), 2);
        store.close().await;
    }

    #[tokio::test]
    async fn test_append_for_wrong_thread_is_invalid() {
        let store = SqliteCheckpointStore::in_memory().await.unwrap();
        let err = store.append("a", checkpoint("b", 0)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Invalid(_)));
        assert!(store.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("checkpoints.sqlite");

        let cp = checkpoint("t", 0);
        {
            let store = SqliteCheckpointStore::open(&path).await.unwrap();
            store.append("t", cp.clone()).await.unwrap();
            store.close().await;
        }

        let reopened = SqliteCheckpointStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_latest("t").await.unwrap().unwrap(), cp);
        reopened.close().await;
    }
}
