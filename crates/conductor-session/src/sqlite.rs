use crate::checkpoint::{Checkpoint, CheckpointStore};
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    run_id    TEXT PRIMARY KEY,
    version   INTEGER NOT NULL,
    cancelled INTEGER NOT NULL DEFAULT 0,
    body      TEXT NOT NULL,
    saved_at  TEXT NOT NULL
);
";

/// SQLite-backed checkpoints, one row per run.
///
/// Blocking database calls run on the tokio blocking pool.
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// Opens (or creates) the database file.
    pub fn open(path: impl AsRef<Path>) -> ConductorResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(sql_error)?;
        // journal_mode returns a row, so it cannot go through execute().
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(sql_error)?;
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn in_memory() -> ConductorResult<Self> {
        Self::init(Connection::open_in_memory().map_err(sql_error)?)
    }

    fn init(conn: Connection) -> ConductorResult<Self> {
        conn.execute_batch(SCHEMA).map_err(sql_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> ConductorResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| ConductorError::Checkpoint(format!("Checkpoint task failed: {e}")))?
        .map_err(sql_error)
    }
}

fn sql_error(e: rusqlite::Error) -> ConductorError {
    ConductorError::Checkpoint(format!("SQLite: {e}"))
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> ConductorResult<()> {
        let body = serde_json::to_string(checkpoint)?;
        let run_id = checkpoint.run_id().to_string();
        let version = i64::try_from(checkpoint.version)
            .map_err(|_| ConductorError::Checkpoint("version out of range".into()))?;
        let cancelled = checkpoint.cancelled;
        let saved_at = checkpoint.saved_at.to_rfc3339();

        debug!(run_id = %run_id, version, "Saving checkpoint");
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (run_id, version, cancelled, body, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(run_id) DO UPDATE SET
                     version = excluded.version,
                     cancelled = excluded.cancelled,
                     body = excluded.body,
                     saved_at = excluded.saved_at",
                params![run_id, version, cancelled, body, saved_at],
            )
            .map(|_| ())
        })
        .await
    }

    async fn load(&self, run_id: Uuid) -> ConductorResult<Option<Checkpoint>> {
        let key = run_id.to_string();
        let body: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT body FROM checkpoints WHERE run_id = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        match body {
            Some(body) => {
                let checkpoint = serde_json::from_str(&body).map_err(|e| {
                    ConductorError::Checkpoint(format!("Failed to parse checkpoint {run_id}: {e}"))
                })?;
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> ConductorResult<Vec<Uuid>> {
        let rows: Vec<String> = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT run_id FROM checkpoints ORDER BY saved_at")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(ids)
            })
            .await?;
        Ok(rows
            .iter()
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect())
    }

    async fn delete(&self, run_id: Uuid) -> ConductorResult<()> {
        let key = run_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM checkpoints WHERE run_id = ?1", params![key])
                .map(|_| ())
        })
        .await
    }
}
