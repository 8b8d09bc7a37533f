use crate::config::EngineConfig;
use crate::node::NodeName;
use crate::nodes::finalizer::{closing_delta, fallback_answer};
use crate::nodes::say;
use crate::nodes::worker::failure_delta;
use crate::registry::NodeRegistry;
use crate::router::{route, Route};
use conductor_core::{ConductorError, ConductorResult, Consent, MessageKind, Role};
use conductor_security::{AuditLog, AuditOutcome};
use conductor_session::{
    RunPhase, RunState, RunStatus, Snapshot, StateDelta, StateStore, TranscriptEntry,
    TranscriptEvent, TranscriptStore,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drives supersteps: node, merge, route, repeat.
///
/// A superstep always starts at the clarifier and ends when the router
/// pauses for the user, the finalizer has run, or the run is cancelled.
pub struct Orchestrator {
    store: Arc<StateStore>,
    nodes: Arc<NodeRegistry>,
    config: EngineConfig,
    transcripts: Option<Arc<dyn TranscriptStore>>,
    audit: Option<Arc<AuditLog>>,
}

impl Orchestrator {
    /// Engine over `store` with the given nodes.
    pub fn new(store: Arc<StateStore>, nodes: NodeRegistry, config: EngineConfig) -> Self {
        Self {
            store,
            nodes: Arc::new(nodes),
            config,
            transcripts: None,
            audit: None,
        }
    }

    /// Log node events to `transcripts`.
    pub fn with_transcripts(mut self, transcripts: Arc<dyn TranscriptStore>) -> Self {
        self.transcripts = Some(transcripts);
        self
    }

    /// Record tool runs and approvals in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The state store runs are read from and written to.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Engine limits.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Node events logged for `run_id`, oldest superstep first.
    pub async fn events(&self, run_id: Uuid) -> ConductorResult<Vec<TranscriptEntry>> {
        match &self.transcripts {
            Some(transcripts) => transcripts.read(run_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Runs one superstep from the persisted state of `run_id`.
    pub async fn run_superstep(&self, run_id: Uuid) -> ConductorResult<Snapshot> {
        let mut snapshot = self.store.get(run_id).await?;
        let superstep = snapshot.version;
        let mut current = NodeName::Clarifier;
        let mut steps: u32 = 0;

        info!(run_id = %run_id, version = superstep, "Superstep started");

        loop {
            if self.store.is_cancelled(run_id).await? {
                warn!(run_id = %run_id, node = %current, "Run cancelled, stopping before next node");
                snapshot = self
                    .store
                    .apply(run_id, snapshot.version, StateDelta::new().phase(RunPhase::Cancelled))
                    .await?;
                self.record(run_id, superstep, TranscriptEvent::Finished {
                    status: status_label(RunStatus::Cancelled).into(),
                })
                .await;
                return Ok(snapshot);
            }

            if steps >= self.config.max_steps_per_superstep && current != NodeName::Finalizer {
                if snapshot.state.aborted.is_none() {
                    let reason = format!(
                        "step budget of {} exhausted",
                        self.config.max_steps_per_superstep
                    );
                    error!(run_id = %run_id, node = %current, "Aborting run: {reason}");
                    self.audit_abort(run_id, current, &reason);
                    snapshot = self
                        .store
                        .apply(run_id, snapshot.version, abort_delta(current, &reason))
                        .await?;
                }
                current = NodeName::Finalizer;
            }

            let node = self.nodes.get(current)?;
            self.record(run_id, superstep, TranscriptEvent::NodeStarted {
                node: current.to_string(),
            })
            .await;
            debug!(run_id = %run_id, node = %current, "Node started");

            let started = Instant::now();
            let outcome =
                match tokio::time::timeout(self.config.node_timeout(), node.run(&snapshot.state))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ConductorError::NodeTimeout {
                        node: current.to_string(),
                        secs: self.config.node_timeout_secs,
                    }),
                };

            let mut delta = match outcome {
                Ok(delta) => delta,
                Err(e) => {
                    self.record(run_id, superstep, TranscriptEvent::NodeFailed {
                        node: current.to_string(),
                        error: e.to_string(),
                    })
                    .await;
                    self.recover(current, &snapshot.state, e)
                }
            };
            if delta.phase.is_none() {
                delta.phase = Some(current.phase());
            }

            let events = observe(&delta);
            snapshot = self.store.apply(run_id, snapshot.version, delta).await?;
            self.report(run_id, superstep, current, events).await;

            let duration_ms = started.elapsed().as_millis() as u64;
            self.record(run_id, superstep, TranscriptEvent::NodeFinished {
                node: current.to_string(),
                duration_ms,
                version: snapshot.version,
            })
            .await;
            steps += 1;

            match route(current, &snapshot.state) {
                Route::Node(next) => {
                    debug!(run_id = %run_id, from = %current, route = %next, "Routed");
                    self.record(run_id, superstep, TranscriptEvent::Routed {
                        from: current.to_string(),
                        to: next.to_string(),
                    })
                    .await;
                    current = next;
                }
                Route::Wait => {
                    snapshot = self
                        .store
                        .apply(
                            run_id,
                            snapshot.version,
                            StateDelta::new().phase(RunPhase::WaitingForUser),
                        )
                        .await?;
                    info!(run_id = %run_id, version = snapshot.version, steps, "Paused for user input");
                    self.record(run_id, superstep, TranscriptEvent::Paused).await;
                    return Ok(snapshot);
                }
                Route::End => {
                    let phase = if snapshot.state.aborted.is_some() {
                        RunPhase::Aborted
                    } else {
                        RunPhase::Terminal
                    };
                    snapshot = self
                        .store
                        .apply(run_id, snapshot.version, StateDelta::new().phase(phase))
                        .await?;
                    let status = snapshot.state.status();
                    info!(run_id = %run_id, version = snapshot.version, steps, status = status_label(status), "Run finished");
                    self.record(run_id, superstep, TranscriptEvent::Finished {
                        status: status_label(status).into(),
                    })
                    .await;
                    return Ok(snapshot);
                }
            }
        }
    }

    /// Turns a node error into the delta that records it.
    ///
    /// Transient worker failures become failed subtasks; the finalizer falls
    /// back to a state-derived answer; everything else aborts the run.
    fn recover(&self, node: NodeName, state: &RunState, err: ConductorError) -> StateDelta {
        if node == NodeName::Finalizer {
            warn!(run_id = %state.run_id, error = %err, "Finalizer failed, closing with fallback");
            return closing_delta(fallback_answer(state));
        }
        let worker_failure = node.worker().is_some()
            && err.is_transient()
            && state.current_subtask().is_some();
        if worker_failure {
            warn!(run_id = %state.run_id, node = %node, error = %err, "Subtask failed");
            return failure_delta(node, state, &err.to_string());
        }
        error!(run_id = %state.run_id, node = %node, error = %err, "Fatal node error, aborting run");
        let reason = err.to_string();
        self.audit_abort(state.run_id, node, &reason);
        abort_delta(node, &reason)
    }

    async fn report(&self, run_id: Uuid, superstep: u64, node: NodeName, events: Observed) {
        for event in events.transcript {
            self.record(run_id, superstep, event).await;
        }
        let Some(audit) = &self.audit else {
            return;
        };
        for (tool, details, outcome) in events.tool_runs {
            audit.log_action(run_id, "tool_executed", Some(tool), details, outcome);
        }
        if let Some(tools) = events.gated {
            audit.log_action(
                run_id,
                "approval_requested",
                None,
                serde_json::json!({ "node": node.as_str(), "tools": tools }),
                AuditOutcome::Pending,
            );
        }
        match events.consent {
            Some(Consent::Granted) => audit.log_action(
                run_id,
                "approval_granted",
                None,
                serde_json::json!({}),
                AuditOutcome::Success,
            ),
            Some(Consent::Declined) => audit.log_action(
                run_id,
                "approval_declined",
                None,
                serde_json::json!({}),
                AuditOutcome::Denied,
            ),
            _ => {}
        }
    }

    fn audit_abort(&self, run_id: Uuid, node: NodeName, reason: &str) {
        if let Some(audit) = &self.audit {
            audit.log_action(
                run_id,
                "run_aborted",
                None,
                serde_json::json!({ "node": node.as_str(), "reason": reason }),
                AuditOutcome::Error,
            );
        }
    }

    pub(crate) async fn record(&self, run_id: Uuid, superstep: u64, event: TranscriptEvent) {
        if let Some(transcripts) = &self.transcripts {
            if let Err(e) = transcripts
                .append(TranscriptEntry::new(run_id, superstep, event))
                .await
            {
                warn!(run_id = %run_id, error = %e, "Failed to write transcript event");
            }
        }
    }
}

fn abort_delta(node: NodeName, reason: &str) -> StateDelta {
    StateDelta::new()
        .abort(reason)
        .message(say(node, MessageKind::Failure, format!("Run aborted: {reason}")))
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::WaitingForUser => "waiting_for_user",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

/// What a delta is about to do, for the transcript log and the audit trail.
#[derive(Default)]
struct Observed {
    transcript: Vec<TranscriptEvent>,
    tool_runs: Vec<(String, serde_json::Value, AuditOutcome)>,
    gated: Option<Vec<String>>,
    consent: Option<Consent>,
}

fn observe(delta: &StateDelta) -> Observed {
    let mut observed = Observed::default();
    for msg in &delta.transcript {
        match msg.role {
            Role::Assistant if msg.kind != MessageKind::ApprovalRequest => {
                for call in &msg.tool_calls {
                    observed.transcript.push(TranscriptEvent::ToolCallRequest {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    });
                }
            }
            Role::Tool => {
                let tool = msg.name.clone().unwrap_or_default();
                let call_id = msg.tool_call_id.clone().unwrap_or_default();
                let is_error = msg.kind == MessageKind::Failure;
                observed.transcript.push(TranscriptEvent::ToolCallResult {
                    call_id: call_id.clone(),
                    tool_name: tool.clone(),
                    content: msg.content.clone(),
                    is_error,
                });
                let outcome = if is_error {
                    AuditOutcome::Error
                } else {
                    AuditOutcome::Success
                };
                observed
                    .tool_runs
                    .push((tool, serde_json::json!({ "call_id": call_id }), outcome));
            }
            _ => {}
        }
    }
    if delta.side_effects_requested == Some(true) {
        if let Some(calls) = delta.pending_tool_calls.as_ref().filter(|c| !c.is_empty()) {
            let tools: Vec<String> = calls.iter().map(|c| c.name.clone()).collect();
            observed.transcript.push(TranscriptEvent::GateFired {
                tools: tools.clone(),
            });
            observed.gated = Some(tools);
        }
    }
    observed.consent = delta
        .user_side_effects_confirmed
        .filter(|c| *c != Consent::Unset);
    observed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_core::{Message, ToolCall, ToolResult};

    #[test]
    fn gate_and_tool_results_are_observed() {
        let call = ToolCall::new("c1", "write_file", serde_json::json!({}));
        let gate = StateDelta {
            side_effects_requested: Some(true),
            pending_tool_calls: Some(vec![call.clone()]),
            ..StateDelta::default()
        }
        .message(
            say(NodeName::Executor, MessageKind::ApprovalRequest, "approve?")
                .with_tool_calls(vec![call]),
        );
        let seen = observe(&gate);
        assert_eq!(seen.gated, Some(vec!["write_file".to_string()]));
        // Parked calls are not reported as requests until they run.
        assert_eq!(seen.transcript.len(), 1);

        let ran = StateDelta::new()
            .message(Message::tool_result("write_file", &ToolResult::error("c1", "disk full")));
        let seen = observe(&ran);
        assert_eq!(seen.tool_runs.len(), 1);
        assert_eq!(seen.tool_runs[0].2, AuditOutcome::Error);
    }

    #[test]
    fn only_explicit_consent_is_observed() {
        let unset = StateDelta {
            user_side_effects_confirmed: Some(Consent::Unset),
            ..StateDelta::default()
        };
        assert!(observe(&unset).consent.is_none());
        let declined = StateDelta {
            user_side_effects_confirmed: Some(Consent::Declined),
            ..StateDelta::default()
        };
        assert_eq!(observe(&declined).consent, Some(Consent::Declined));
    }
}
