use crate::engine::Orchestrator;
use conductor_core::{ConductorError, ConductorResult, Message};
use conductor_session::{
    RunOutcome, RunPhase, Snapshot, StateDelta, StateStore, SubmissionRecord, TranscriptEntry,
    TranscriptEvent,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Entry point for callers: one user message in, one superstep out.
///
/// Every submission resumes from the last checkpoint of its run. At most
/// one submission per run is in flight; a second one is rejected as stale
/// rather than interleaved.
pub struct Gateway {
    store: Arc<StateStore>,
    orchestrator: Arc<Orchestrator>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Releases the run's in-flight slot on drop.
struct InFlight {
    runs: Arc<Mutex<HashSet<Uuid>>>,
    run_id: Uuid,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.runs.lock().remove(&self.run_id);
    }
}

impl Gateway {
    /// Gateway over `orchestrator` and its state store.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            store: Arc::clone(orchestrator.store()),
            orchestrator,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Starts an empty run and returns its id.
    pub async fn create_run(&self) -> ConductorResult<Uuid> {
        let run_id = Uuid::new_v4();
        self.store.create(run_id).await?;
        info!(run_id = %run_id, "Run created");
        Ok(run_id)
    }

    /// Submits a user message and runs one superstep.
    pub async fn submit(
        &self,
        run_id: Uuid,
        content: impl Into<String>,
    ) -> ConductorResult<RunOutcome> {
        self.submit_with_key(run_id, content, None).await
    }

    /// Submits a user message and runs one superstep.
    ///
    /// With an idempotency key, resubmitting the same message under the same
    /// key returns the recorded outcome without running anything. If the
    /// first attempt failed before its superstep finished, the resubmission
    /// resumes that superstep without appending the message again. Reusing
    /// the key for a different message is an error.
    pub async fn submit_with_key(
        &self,
        run_id: Uuid,
        content: impl Into<String>,
        key: Option<&str>,
    ) -> ConductorResult<RunOutcome> {
        let content = content.into();
        let snapshot = self.store.get(run_id).await?;
        if self.store.is_cancelled(run_id).await? {
            return Err(ConductorError::Cancelled(run_id));
        }

        let digest = key.map(|_| fingerprint(&content));
        let mut resume_from = None;
        if let (Some(key), Some(record)) = (key, &snapshot.state.last_submission) {
            if record.key == key {
                if digest.as_deref() != Some(record.fingerprint.as_str()) {
                    return Err(ConductorError::Config(format!(
                        "Idempotency key '{key}' was already used for a different message"
                    )));
                }
                if let Some(outcome) = &record.outcome {
                    info!(run_id = %run_id, key, "Replaying recorded submission");
                    return Ok(outcome.clone());
                }
                warn!(run_id = %run_id, key, "Resuming an unfinished submission");
                resume_from = Some(record.transcript_start);
            }
        }

        let _slot = self.claim(run_id, snapshot.version).await?;

        let start = match resume_from {
            Some(start) => start,
            None => {
                self.open(run_id, &snapshot, content, key.zip(digest.clone()))
                    .await?
            }
        };

        let end = self.orchestrator.run_superstep(run_id).await?;
        let mut outcome = RunOutcome {
            run_id,
            transcript_delta: end.state.transcript[start..].to_vec(),
            paused: end.state.phase == RunPhase::WaitingForUser,
            status: end.state.status(),
            final_answer: end.state.final_answer.clone(),
            version: end.version,
        };

        if let (Some(key), Some(fingerprint)) = (key, digest) {
            outcome.version += 1;
            let record = SubmissionRecord {
                key: key.to_string(),
                fingerprint,
                transcript_start: start,
                outcome: Some(outcome.clone()),
            };
            self.store
                .apply(
                    run_id,
                    end.version,
                    StateDelta {
                        last_submission: Some(record),
                        ..StateDelta::default()
                    },
                )
                .await?;
        }

        info!(
            run_id = %run_id,
            version = outcome.version,
            paused = outcome.paused,
            messages = outcome.transcript_delta.len(),
            "Submission handled"
        );
        Ok(outcome)
    }

    /// Appends the user message, starting a new cycle on a finished run.
    /// Returns the transcript length before the message.
    async fn open(
        &self,
        run_id: Uuid,
        snapshot: &Snapshot,
        content: String,
        keyed: Option<(&str, String)>,
    ) -> ConductorResult<usize> {
        let start = snapshot.state.transcript.len();
        let mut version = snapshot.version;
        if snapshot.state.is_terminal() {
            info!(run_id = %run_id, "Starting a new request cycle on a finished run");
            version = self
                .store
                .apply(run_id, version, StateDelta::new_cycle())
                .await?
                .version;
        }
        let pending = keyed.map(|(key, fingerprint)| SubmissionRecord {
            key: key.to_string(),
            fingerprint,
            transcript_start: start,
            outcome: None,
        });
        let opened = self
            .store
            .apply(
                run_id,
                version,
                StateDelta {
                    last_submission: pending,
                    ..StateDelta::default()
                }
                .message(Message::user(content.clone()))
                .phase(RunPhase::Clarifying),
            )
            .await?;
        self.orchestrator
            .record(run_id, opened.version, TranscriptEvent::UserMessage { content })
            .await;
        Ok(start)
    }

    /// Latest persisted state of the run.
    pub async fn state(&self, run_id: Uuid) -> ConductorResult<Snapshot> {
        self.store.get(run_id).await
    }

    /// Node events logged for the run.
    pub async fn events(&self, run_id: Uuid) -> ConductorResult<Vec<TranscriptEntry>> {
        self.orchestrator.events(run_id).await
    }

    /// Stops the run at the next node boundary and refuses further input.
    pub async fn cancel(&self, run_id: Uuid) -> ConductorResult<()> {
        self.store.cancel(run_id).await
    }

    /// Ids of every persisted run.
    pub async fn runs(&self) -> ConductorResult<Vec<Uuid>> {
        self.store.list().await
    }

    async fn claim(&self, run_id: Uuid, read_version: u64) -> ConductorResult<InFlight> {
        let claimed = self.in_flight.lock().insert(run_id);
        if claimed {
            return Ok(InFlight {
                runs: Arc::clone(&self.in_flight),
                run_id,
            });
        }
        let actual = self.store.get(run_id).await?.version;
        warn!(run_id = %run_id, read_version, actual, "Submission rejected, run is busy");
        Err(ConductorError::StaleRun {
            run_id,
            expected: read_version,
            actual,
        })
    }
}

fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
