use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// One line of `audit.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
    /// Run it belongs to.
    pub run_id: Uuid,
    /// What happened, e.g. `tool_executed`.
    pub action: String,
    /// Tool involved, if any.
    pub tool: Option<String>,
    /// Action-specific details.
    pub details: serde_json::Value,
    /// How it ended.
    pub outcome: AuditOutcome,
}

/// Result of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Completed.
    Success,
    /// Refused by the user or a policy.
    Denied,
    /// Waiting on a decision.
    Pending,
    /// Failed.
    Error,
}

/// Append-only audit log of gate decisions, tool executions and aborts.
pub struct AuditLog {
    tx: mpsc::UnboundedSender<AuditEntry>,
    path: PathBuf,
}

impl AuditLog {
    /// Create a new AuditLog. Spawns a background task that appends entries
    /// to `<log_dir>/audit.jsonl`. Must be called inside a tokio runtime.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();
        let path = log_dir.join("audit.jsonl");
        let log_file = path.clone();

        tokio::spawn(async move {
            if let Err(e) = tokio::fs::create_dir_all(&log_dir).await {
                warn!(error = %e, dir = %log_dir.display(), "Cannot create audit directory");
                return;
            }
            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .await
            {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, "Cannot open audit log");
                    return;
                }
            };

            while let Some(entry) = rx.recv().await {
                let mut line = match serde_json::to_string(&entry) {
                    Ok(l) => l,
                    Err(e) => {
                        warn!(error = %e, "Cannot serialize audit entry");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    warn!(error = %e, "Audit write failed");
                    continue;
                }
                let _ = file.flush().await;
            }
        });

        Self { tx, path }
    }

    /// Location of the JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues `entry` for the writer task.
    pub fn log(&self, entry: AuditEntry) {
        info!(
            run_id = %entry.run_id,
            action = %entry.action,
            outcome = ?entry.outcome,
            "audit"
        );
        let _ = self.tx.send(entry);
    }

    /// Queues an entry built from its parts.
    pub fn log_action(
        &self,
        run_id: Uuid,
        action: impl Into<String>,
        tool: Option<String>,
        details: serde_json::Value,
        outcome: AuditOutcome,
    ) {
        self.log(AuditEntry {
            timestamp: Utc::now(),
            run_id,
            action: action.into(),
            tool,
            details,
            outcome,
        });
    }
}

/// Reads back every entry of an audit file.
pub async fn read_entries(path: &Path) -> std::io::Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = tokio::fs::read_to_string(path).await?;
    Ok(data
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn entries_are_appended_in_order() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(tmp.path().join("audit"));
        let run_id = Uuid::new_v4();

        log.log_action(
            run_id,
            "gate",
            Some("write_file".into()),
            serde_json::json!({"subtask": 0}),
            AuditOutcome::Pending,
        );
        log.log_action(
            run_id,
            "tool_executed",
            Some("write_file".into()),
            serde_json::json!({}),
            AuditOutcome::Success,
        );

        let mut entries = Vec::new();
        for _ in 0..50 {
            entries = read_entries(log.path()).await.unwrap();
            if entries.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "gate");
        assert_eq!(entries[0].outcome, AuditOutcome::Pending);
        assert_eq!(entries[1].action, "tool_executed");
        assert_eq!(entries[1].run_id, run_id);
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let entries = read_entries(&tmp.path().join("none.jsonl")).await.unwrap();
        assert!(entries.is_empty());
    }
}
