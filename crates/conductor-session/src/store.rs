use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::delta::StateDelta;
use crate::state::RunState;
use conductor_core::{ConductorError, ConductorResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A run state together with the store version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The state.
    pub state: RunState,
    /// Version it was read at.
    pub version: u64,
}

#[derive(Clone)]
struct Entry {
    state: RunState,
    version: u64,
    cancelled: bool,
}

impl Entry {
    fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.state.clone(), self.version, self.cancelled)
    }
}

/// Owner of every run state.
///
/// Reads are served from memory, loading checkpoints lazily. Writes are
/// serialized, checked against the caller's version and persisted before
/// they become visible.
pub struct StateStore {
    runs: RwLock<HashMap<Uuid, Entry>>,
    write_lock: Mutex<()>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl StateStore {
    /// Store persisting through `checkpoints`.
    pub fn new(checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
            checkpoints,
        }
    }

    /// Creates and persists an empty run.
    pub async fn create(&self, run_id: Uuid) -> ConductorResult<Snapshot> {
        let _guard = self.write_lock.lock().await;
        if self.entry(run_id).await?.is_some() {
            return Err(ConductorError::Config(format!("Run {run_id} already exists")));
        }
        let entry = Entry {
            state: RunState::new(run_id),
            version: 0,
            cancelled: false,
        };
        self.checkpoints.save(&entry.checkpoint()).await?;
        self.runs.write().insert(run_id, entry.clone());
        info!(run_id = %run_id, "Run created");
        Ok(Snapshot {
            state: entry.state,
            version: 0,
        })
    }

    /// Current state and version of a run.
    pub async fn get(&self, run_id: Uuid) -> ConductorResult<Snapshot> {
        let entry = self
            .entry(run_id)
            .await?
            .ok_or(ConductorError::RunNotFound(run_id))?;
        Ok(Snapshot {
            state: entry.state,
            version: entry.version,
        })
    }

    /// Merges `delta` if the stored version still equals `expected_version`.
    ///
    /// A delta that would break the stable-point invariants is rejected and
    /// nothing is written.
    pub async fn apply(
        &self,
        run_id: Uuid,
        expected_version: u64,
        delta: StateDelta,
    ) -> ConductorResult<Snapshot> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .entry(run_id)
            .await?
            .ok_or(ConductorError::RunNotFound(run_id))?;

        if current.version != expected_version {
            warn!(
                run_id = %run_id,
                expected = expected_version,
                actual = current.version,
                "Rejected stale delta"
            );
            return Err(ConductorError::StaleRun {
                run_id,
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut next = current;
        delta.apply_to(&mut next.state);
        next.state
            .check_invariants()
            .map_err(ConductorError::InvalidDelta)?;
        next.version += 1;

        self.checkpoints.save(&next.checkpoint()).await?;
        self.runs.write().insert(run_id, next.clone());
        debug!(run_id = %run_id, version = next.version, "Delta applied");

        Ok(Snapshot {
            state: next.state,
            version: next.version,
        })
    }

    /// Flags the run as cancelled. Idempotent.
    pub async fn cancel(&self, run_id: Uuid) -> ConductorResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entry = self
            .entry(run_id)
            .await?
            .ok_or(ConductorError::RunNotFound(run_id))?;
        if entry.cancelled {
            return Ok(());
        }
        entry.cancelled = true;
        self.checkpoints.save(&entry.checkpoint()).await?;
        self.runs.write().insert(run_id, entry);
        info!(run_id = %run_id, "Run cancelled");
        Ok(())
    }

    /// The run was cancelled.
    pub async fn is_cancelled(&self, run_id: Uuid) -> ConductorResult<bool> {
        Ok(self
            .entry(run_id)
            .await?
            .ok_or(ConductorError::RunNotFound(run_id))?
            .cancelled)
    }

    /// Ids of every persisted run.
    pub async fn list(&self) -> ConductorResult<Vec<Uuid>> {
        self.checkpoints.list().await
    }

    async fn entry(&self, run_id: Uuid) -> ConductorResult<Option<Entry>> {
        let cached = self.runs.read().get(&run_id).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        let Some(cp) = self.checkpoints.load(run_id).await? else {
            return Ok(None);
        };
        debug!(run_id = %run_id, version = cp.version, "Loaded run from checkpoint");
        let entry = Entry {
            state: cp.state,
            version: cp.version,
            cancelled: cp.cancelled,
        };
        // A concurrent writer may have inserted meanwhile; its entry wins.
        let mut runs = self.runs.write();
        Ok(Some(runs.entry(run_id).or_insert(entry).clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::state::{Subtask, WorkerKind};
    use conductor_core::Message;

    fn store() -> StateStore {
        StateStore::new(Arc::new(MemoryCheckpointStore::new()))
    }

    #[tokio::test]
    async fn apply_bumps_version() {
        let store = store();
        let id = Uuid::new_v4();
        store.create(id).await.unwrap();

        let snap = store
            .apply(id, 0, StateDelta::new().message(Message::user("hi")))
            .await
            .unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(store.get(id).await.unwrap().state.transcript.len(), 1);
    }

    #[tokio::test]
    async fn stale_version_is_rejected_without_writing() {
        let store = store();
        let id = Uuid::new_v4();
        store.create(id).await.unwrap();
        store
            .apply(id, 0, StateDelta::new().message(Message::user("first")))
            .await
            .unwrap();

        let err = store
            .apply(id, 0, StateDelta::new().message(Message::user("late")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConductorError::StaleRun {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert_eq!(store.get(id).await.unwrap().state.transcript.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_applies_have_one_winner() {
        let store = Arc::new(store());
        let id = Uuid::new_v4();
        store.create(id).await.unwrap();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .apply(id, 0, StateDelta::new().message(Message::user("a")))
                    .await
            })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .apply(id, 0, StateDelta::new().message(Message::user("b")))
                    .await
            })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let stale = results
            .iter()
            .filter(|r| matches!(r, Err(ConductorError::StaleRun { .. })))
            .count();
        assert_eq!((ok, stale), (1, 1));
        assert_eq!(store.get(id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn invariant_breaking_delta_is_rejected() {
        let store = store();
        let id = Uuid::new_v4();
        store.create(id).await.unwrap();
        let delta = StateDelta {
            subtasks: Some(vec![Subtask::new("look", WorkerKind::Researcher, false)]),
            next_subtask_index: Some(1),
            ..Default::default()
        };
        let err = store.apply(id, 0, delta).await.unwrap_err();
        assert!(matches!(err, ConductorError::InvalidDelta(_)));
        assert_eq!(store.get(id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn runs_reload_from_checkpoints() {
        let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let id = Uuid::new_v4();
        {
            let store = StateStore::new(Arc::clone(&checkpoints));
            store.create(id).await.unwrap();
            store
                .apply(id, 0, StateDelta::new().message(Message::user("persisted")))
                .await
                .unwrap();
            store.cancel(id).await.unwrap();
        }
        let store = StateStore::new(checkpoints);
        let snap = store.get(id).await.unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.state.transcript[0].content, "persisted");
        assert!(store.is_cancelled(id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let err = store().get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ConductorError::RunNotFound(_)));
    }
}
