use crate::state::RunState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::{ConductorError, ConductorResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A persisted run: state, store version and cancellation flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// State at the checkpoint.
    pub state: RunState,
    /// Store version of `state`.
    pub version: u64,
    /// The run was cancelled.
    #[serde(default)]
    pub cancelled: bool,
    /// When it was written.
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint stamped with the current time.
    pub fn new(state: RunState, version: u64, cancelled: bool) -> Self {
        Self {
            state,
            version,
            cancelled,
            saved_at: Utc::now(),
        }
    }

    /// Run the checkpoint belongs to.
    pub fn run_id(&self) -> Uuid {
        self.state.run_id
    }
}

/// Durable storage for run checkpoints. One checkpoint per run; a save
/// replaces the previous one.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Writes `checkpoint`, replacing the run's previous one.
    async fn save(&self, checkpoint: &Checkpoint) -> ConductorResult<()>;
    /// Latest checkpoint of `run_id`.
    async fn load(&self, run_id: Uuid) -> ConductorResult<Option<Checkpoint>>;
    /// Ids of every stored run.
    async fn list(&self) -> ConductorResult<Vec<Uuid>>;
    /// Removes the run. Missing runs are not an error.
    async fn delete(&self, run_id: Uuid) -> ConductorResult<()>;
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

/// Process-local store, for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<Uuid, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> ConductorResult<()> {
        self.entries
            .lock()
            .insert(checkpoint.run_id(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> ConductorResult<Option<Checkpoint>> {
        Ok(self.entries.lock().get(&run_id).cloned())
    }

    async fn list(&self) -> ConductorResult<Vec<Uuid>> {
        Ok(self.entries.lock().keys().copied().collect())
    }

    async fn delete(&self, run_id: Uuid) -> ConductorResult<()> {
        self.entries.lock().remove(&run_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileCheckpointStore
// ---------------------------------------------------------------------------

/// One pretty-printed JSON file per run, replaced atomically on save.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Store writing under `dir`, created if missing.
    pub async fn new(dir: PathBuf) -> ConductorResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn checkpoint_path(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> ConductorResult<()> {
        let path = self.checkpoint_path(checkpoint.run_id());
        let json = serde_json::to_string_pretty(checkpoint)?;
        let tmp_path = self.dir.join(format!(
            ".{}.{}.tmp",
            checkpoint.run_id(),
            Uuid::new_v4().simple()
        ));

        let write_result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(ConductorError::Checkpoint(format!(
                "Failed to write checkpoint {}: {e}",
                path.display()
            )));
        }
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> ConductorResult<Option<Checkpoint>> {
        let path = self.checkpoint_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let checkpoint: Checkpoint = serde_json::from_str(&data).map_err(|e| {
            ConductorError::Checkpoint(format!("Failed to parse checkpoint {run_id}: {e}"))
        })?;
        Ok(Some(checkpoint))
    }

    async fn list(&self) -> ConductorResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    async fn delete(&self, run_id: Uuid) -> ConductorResult<()> {
        let path = self.checkpoint_path(run_id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_core::Message;
    use tempfile::TempDir;

    fn checkpoint(version: u64) -> Checkpoint {
        let mut state = RunState::new(Uuid::new_v4());
        state.transcript.push(Message::user("hello"));
        Checkpoint::new(state, version, false)
    }

    #[tokio::test]
    async fn file_store_save_replaces_previous() {
        let tmp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        let mut cp = checkpoint(1);
        store.save(&cp).await.unwrap();
        cp.version = 2;
        store.save(&cp).await.unwrap();

        let loaded = store.load(cp.run_id()).await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(store.list().await.unwrap(), vec![cp.run_id()]);
    }

    #[tokio::test]
    async fn file_store_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        store.save(&checkpoint(1)).await.unwrap();

        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(tmp.path()).await.unwrap();
        while let Some(entry) = dir.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        let id = Uuid::new_v4();
        tokio::fs::write(tmp.path().join(format!("{id}.json")), "{oops")
            .await
            .unwrap();
        let err = store.load(id).await.unwrap_err();
        assert!(matches!(err, ConductorError::Checkpoint(_)));
    }

    #[tokio::test]
    async fn memory_store_delete() {
        let store = MemoryCheckpointStore::new();
        let cp = checkpoint(0);
        store.save(&cp).await.unwrap();
        store.delete(cp.run_id()).await.unwrap();
        assert!(store.load(cp.run_id()).await.unwrap().is_none());
    }
}
