//! SQLite-backed checkpointer (feature `sqlite`).
//!
//! State and metadata are stored as JSON via [`JsonSerializer`], one row per checkpoint,
//! keyed by `(thread_id, sequence_no)`. Calls run on the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::state::State;

use super::checkpoint::{now_millis, Checkpoint, CheckpointMetadata};
use super::checkpointer::{CheckpointError, Checkpointer, RetentionPolicy};
use super::serializer::{JsonSerializer, Serializer};

const SCHEMA: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;

    CREATE TABLE IF NOT EXISTS checkpoints (
        thread_id TEXT NOT NULL,
        sequence_no INTEGER NOT NULL,
        parent_sequence_no INTEGER,
        state BLOB NOT NULL,
        metadata BLOB NOT NULL,
        created_at_ms INTEGER NOT NULL,
        PRIMARY KEY (thread_id, sequence_no)
    );

    CREATE TABLE IF NOT EXISTS thread_sequences (
        thread_id TEXT PRIMARY KEY,
        last_sequence_no INTEGER NOT NULL
    );
";

/// Durable checkpointer; suspended threads survive a process restart.
pub struct SqliteSaver {
    conn: Arc<Mutex<Connection>>,
    retention: RetentionPolicy,
    serializer: JsonSerializer,
}

impl SqliteSaver {
    /// Opens (or creates) the database file and its tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Storage(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(storage)?;
        Self::from_connection(conn)
    }

    /// In-memory database; useful for tests.
    pub fn open_in_memory() -> Result<Self, CheckpointError> {
        Self::from_connection(Connection::open_in_memory().map_err(storage)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CheckpointError> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            retention: RetentionPolicy::default(),
            serializer: JsonSerializer,
        })
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CheckpointError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, CheckpointError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    fn decode(
        &self,
        thread_id: String,
        sequence_no: i64,
        parent: Option<i64>,
        state: Vec<u8>,
        metadata: Vec<u8>,
    ) -> Result<Checkpoint, CheckpointError> {
        Ok(Checkpoint {
            thread_id,
            sequence_no: sequence_no as u64,
            parent_sequence_no: parent.map(|p| p as u64),
            state: self.serializer.deserialize(&state)?,
            metadata: self.serializer.deserialize(&metadata)?,
        })
    }
}

fn storage(e: rusqlite::Error) -> CheckpointError {
    CheckpointError::Storage(e.to_string())
}

type Row = (String, i64, Option<i64>, Vec<u8>, Vec<u8>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

#[async_trait]
impl Checkpointer for SqliteSaver {
    async fn save(
        &self,
        thread_id: &str,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Result<u64, CheckpointError> {
        let state_bytes = self.serializer.serialize(state)?;
        let created_at_ms = metadata.timestamp_ms as i64;
        let metadata_bytes = self.serializer.serialize(&metadata)?;
        let thread_id = thread_id.to_string();
        let retention = self.retention;

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(storage)?;
            let last: Option<i64> = tx
                .query_row(
                    "SELECT last_sequence_no FROM thread_sequences WHERE thread_id = ?1",
                    params![thread_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage)?;
            let sequence_no = last.map_or(1, |n| n + 1);
            tx.execute(
                "INSERT INTO checkpoints
                 (thread_id, sequence_no, parent_sequence_no, state, metadata, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    thread_id,
                    sequence_no,
                    last,
                    state_bytes,
                    metadata_bytes,
                    created_at_ms
                ],
            )
            .map_err(storage)?;
            tx.execute(
                "INSERT INTO thread_sequences (thread_id, last_sequence_no) VALUES (?1, ?2)
                 ON CONFLICT(thread_id) DO UPDATE SET last_sequence_no = excluded.last_sequence_no",
                params![thread_id, sequence_no],
            )
            .map_err(storage)?;

            let ages: Vec<(u64, u64)> = {
                let mut stmt = tx
                    .prepare(
                        "SELECT sequence_no, created_at_ms FROM checkpoints
                         WHERE thread_id = ?1 ORDER BY sequence_no ASC",
                    )
                    .map_err(storage)?;
                let rows = stmt
                    .query_map(params![thread_id], |row| {
                        Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64))
                    })
                    .map_err(storage)?;
                rows.collect::<Result<_, _>>().map_err(storage)?
            };
            for seq in retention.evictions(&ages, now_millis()) {
                tx.execute(
                    "DELETE FROM checkpoints WHERE thread_id = ?1 AND sequence_no = ?2",
                    params![thread_id, seq as i64],
                )
                .map_err(storage)?;
            }
            tx.commit().map_err(storage)?;
            Ok(sequence_no as u64)
        })
        .await
    }

    async fn get(
        &self,
        thread_id: &str,
        sequence_no: u64,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let thread_id = thread_id.to_string();
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT thread_id, sequence_no, parent_sequence_no, state, metadata
                     FROM checkpoints WHERE thread_id = ?1 AND sequence_no = ?2",
                    params![thread_id, sequence_no as i64],
                    read_row,
                )
                .optional()
                .map_err(storage)
            })
            .await?;
        row.map(|(t, s, p, st, m)| self.decode(t, s, p, st, m))
            .transpose()
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let thread_id = thread_id.to_string();
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT thread_id, sequence_no, parent_sequence_no, state, metadata
                     FROM checkpoints WHERE thread_id = ?1
                     ORDER BY sequence_no DESC LIMIT 1",
                    params![thread_id],
                    read_row,
                )
                .optional()
                .map_err(storage)
            })
            .await?;
        row.map(|(t, s, p, st, m)| self.decode(t, s, p, st, m))
            .transpose()
    }

    async fn sequence_numbers(&self, thread_id: &str) -> Result<Vec<u64>, CheckpointError> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT sequence_no FROM checkpoints
                     WHERE thread_id = ?1 ORDER BY sequence_no DESC",
                )
                .map_err(storage)?;
            let rows = stmt
                .query_map(params![thread_id], |row| Ok(row.get::<_, i64>(0)? as u64))
                .map_err(storage)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage)
        })
        .await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<usize, CheckpointError> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM checkpoints WHERE thread_id = ?1",
                    params![thread_id],
                )
                .map_err(storage)?;
            conn.execute(
                "DELETE FROM thread_sequences WHERE thread_id = ?1",
                params![thread_id],
            )
            .map_err(storage)?;
            Ok(removed)
        })
        .await
    }

    async fn thread_ids(&self) -> Result<Vec<String>, CheckpointError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT thread_id FROM checkpoints ORDER BY thread_id")
                .map_err(storage)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(storage)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage)
        })
        .await
    }
}
