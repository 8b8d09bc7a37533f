use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::ConductorResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TranscriptEvent
// ---------------------------------------------------------------------------

/// Something the orchestrator did while driving a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptEvent {
    /// A user message was accepted.
    UserMessage {
        /// Message text.
        content: String,
    },
    /// A node began.
    NodeStarted {
        /// Node name.
        node: String,
    },
    /// A node's delta was merged.
    NodeFinished {
        /// Node name.
        node: String,
        /// Wall time of the node.
        duration_ms: u64,
        /// Store version after the merge.
        version: u64,
    },
    /// A node returned an error.
    NodeFailed {
        /// Node name.
        node: String,
        /// Error text.
        error: String,
    },
    /// The router picked the next node.
    Routed {
        /// Node that just ran.
        from: String,
        /// Node that runs next.
        to: String,
    },
    /// Tool calls were parked for approval.
    GateFired {
        /// Names of the parked tools.
        tools: Vec<String>,
    },
    /// A worker asked for a tool call.
    ToolCallRequest {
        /// Call id.
        call_id: String,
        /// Tool name.
        tool_name: String,
        /// Call arguments.
        arguments: serde_json::Value,
    },
    /// A tool call returned.
    ToolCallResult {
        /// Call id.
        call_id: String,
        /// Tool name.
        tool_name: String,
        /// Tool output.
        content: String,
        /// The call failed.
        is_error: bool,
    },
    /// The superstep paused for the user.
    Paused,
    /// The superstep ended the run.
    Finished {
        /// Final status label.
        status: String,
    },
}

// ---------------------------------------------------------------------------
// TranscriptEntry
// ---------------------------------------------------------------------------

/// One logged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Entry id.
    pub id: Uuid,
    /// Run it belongs to.
    pub run_id: Uuid,
    /// When it was logged.
    pub timestamp: DateTime<Utc>,
    /// Store version the superstep started from.
    pub superstep: u64,
    /// What happened.
    pub event: TranscriptEvent,
}

impl TranscriptEntry {
    /// Entry stamped with a fresh id and the current time.
    pub fn new(run_id: Uuid, superstep: u64, event: TranscriptEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
            superstep,
            event,
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptStore trait
// ---------------------------------------------------------------------------

/// Append-only event log per run.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Appends `entry` to its run's log.
    async fn append(&self, entry: TranscriptEntry) -> ConductorResult<()>;
    /// Every entry of `run_id`, oldest first.
    async fn read(&self, run_id: Uuid) -> ConductorResult<Vec<TranscriptEntry>>;
}

// ---------------------------------------------------------------------------
// FileTranscriptStore
// ---------------------------------------------------------------------------

/// JSONL file per run under one directory.
pub struct FileTranscriptStore {
    dir: PathBuf,
}

impl FileTranscriptStore {
    /// Store writing under `dir`, created if missing.
    pub async fn new(dir: PathBuf) -> ConductorResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn transcript_path(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.events.jsonl"))
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn append(&self, entry: TranscriptEntry) -> ConductorResult<()> {
        let path = self.transcript_path(entry.run_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read(&self, run_id: Uuid) -> ConductorResult<Vec<TranscriptEntry>> {
        let path = self.transcript_path(run_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut entries: Vec<TranscriptEntry> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| {
            a.superstep
                .cmp(&b.superstep)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn empty_log_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileTranscriptStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        assert!(store.read(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_sort_by_superstep() {
        let tmp = TempDir::new().unwrap();
        let store = FileTranscriptStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        let run = Uuid::new_v4();

        store
            .append(TranscriptEntry::new(run, 5, TranscriptEvent::Paused))
            .await
            .unwrap();
        store
            .append(TranscriptEntry::new(
                run,
                0,
                TranscriptEvent::Routed {
                    from: "clarifier".into(),
                    to: "planner".into(),
                },
            ))
            .await
            .unwrap();

        let entries = store.read(run).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].event, TranscriptEvent::Routed { .. }));
        assert_eq!(entries[1].event, TranscriptEvent::Paused);
    }

    #[tokio::test]
    async fn runs_are_logged_separately() {
        let tmp = TempDir::new().unwrap();
        let store = FileTranscriptStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store
            .append(TranscriptEntry::new(
                a,
                0,
                TranscriptEvent::GateFired {
                    tools: vec!["write_file".into()],
                },
            ))
            .await
            .unwrap();
        assert_eq!(store.read(a).await.unwrap().len(), 1);
        assert!(store.read(b).await.unwrap().is_empty());
    }
}
