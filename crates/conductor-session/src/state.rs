use chrono::{DateTime, Utc};
use conductor_core::{Consent, Message, MessageKind, Role, ToolCall, WorkScope};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Nodes allowed to own a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Gathers information with read-only tools.
    Researcher,
    /// Performs actions, some of which may be gated.
    Executor,
    /// Combines earlier results without new facts.
    Summarizer,
}

impl WorkerKind {
    /// Lowercase node name.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::Researcher => "researcher",
            WorkerKind::Executor => "executor",
            WorkerKind::Summarizer => "summarizer",
        }
    }

    /// Parses a node name, accepting the capitalised forms providers tend to emit.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "researcher" => Some(WorkerKind::Researcher),
            "executor" => Some(WorkerKind::Executor),
            "summarizer" | "summariser" => Some(WorkerKind::Summarizer),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// What the worker should do.
    pub description: String,
    /// The worker that performs it.
    pub owner: WorkerKind,
    /// Whether the step is expected to change the outside world.
    #[serde(default)]
    pub requires_side_effects: bool,
}

impl Subtask {
    /// Subtask for `owner`.
    pub fn new(description: impl Into<String>, owner: WorkerKind, requires_side_effects: bool) -> Self {
        Self {
            description: description.into(),
            owner,
            requires_side_effects,
        }
    }
}

/// Evidence of a failed subtask or tool call, kept for evaluation and replanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskFailure {
    /// Plan revision the subtask belonged to.
    pub plan_revision: u32,
    /// Index of the subtask in its plan.
    pub subtask_index: usize,
    /// Subtask description.
    pub subtask: String,
    /// Tool that failed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// What went wrong.
    pub reason: String,
    /// When it failed.
    pub timestamp: DateTime<Utc>,
}

/// Last node reached by the run, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No request in progress.
    #[default]
    Idle,
    /// Clarifier running.
    Clarifying,
    /// Suspended until the user answers.
    WaitingForUser,
    /// Planner running.
    Planning,
    /// Researcher running.
    Researching,
    /// Executor running.
    Executing,
    /// Summarizer running.
    Summarizing,
    /// Evaluator running.
    Evaluating,
    /// Finalizer running.
    Finalizing,
    /// Finished with an answer.
    Terminal,
    /// Finished after a fatal error.
    Aborted,
    /// Stopped by the caller.
    Cancelled,
}

/// Caller-facing status of a run after a superstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Mid-superstep; only observed on a state read while a submission runs.
    Running,
    /// Suspended until the user answers.
    WaitingForUser,
    /// Finished with a final answer.
    Completed,
    /// Finished with a terminal failure message.
    Failed,
    /// Stopped by the caller.
    Cancelled,
}

/// What one submission produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run the submission went to.
    pub run_id: Uuid,
    /// Messages appended during the superstep, user message included.
    pub transcript_delta: Vec<Message>,
    /// The run is waiting for the user.
    pub paused: bool,
    /// Status after the superstep.
    pub status: RunStatus,
    /// Answer, when the superstep reached the finalizer.
    pub final_answer: Option<String>,
    /// Store version after the superstep.
    pub version: u64,
}

/// A keyed submission and the outcome it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Caller-chosen idempotency key.
    pub key: String,
    /// Digest of the submitted message content.
    pub fingerprint: String,
    /// Transcript length before the message was appended.
    #[serde(default)]
    pub transcript_start: usize,
    /// `None` while the superstep the message started has not finished.
    #[serde(default)]
    pub outcome: Option<RunOutcome>,
}

/// The single record threaded through a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Run id.
    pub run_id: Uuid,
    /// Every message of the run, oldest first.
    #[serde(default)]
    pub transcript: Vec<Message>,
    /// Current plan.
    #[serde(default)]
    pub plan: Option<String>,
    /// Number of plans produced this cycle.
    #[serde(default)]
    pub plan_revision: u32,
    /// Subtasks of the current plan.
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    /// Index of the next subtask to run.
    #[serde(default)]
    pub next_subtask_index: usize,
    /// One result per completed subtask.
    #[serde(default)]
    pub subtask_results: Vec<String>,
    /// What counts as done.
    #[serde(default)]
    pub success_criteria: Option<String>,
    /// Latest evaluator feedback.
    #[serde(default)]
    pub feedback: Option<String>,
    /// The executor parked calls that need approval.
    #[serde(default)]
    pub side_effects_requested: bool,
    /// The parked calls may run.
    #[serde(default)]
    pub side_effects_approved: bool,
    /// The user's answer to the approval request.
    #[serde(default)]
    pub user_side_effects_confirmed: Consent,
    /// The run must ask the user before going on.
    #[serde(default)]
    pub user_input_needed: bool,
    /// The planner should try a new plan.
    #[serde(default)]
    pub replan_needed: bool,
    /// The success criteria are met.
    #[serde(default)]
    pub success_criteria_met: bool,
    /// Answer for the user, once finalized.
    #[serde(default)]
    pub final_answer: Option<String>,
    /// Tool calls held by the approval gate.
    #[serde(default)]
    pub pending_tool_calls: Vec<ToolCall>,
    /// Failures recorded this cycle.
    #[serde(default)]
    pub failures: Vec<SubtaskFailure>,
    /// Set when the run hit a fatal error; the finalizer reports it.
    #[serde(default)]
    pub aborted: Option<String>,
    /// Where the run is.
    #[serde(default)]
    pub phase: RunPhase,
    /// Latest keyed submission.
    #[serde(default)]
    pub last_submission: Option<SubmissionRecord>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// Fresh state for `run_id`.
    pub fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            transcript: Vec::new(),
            plan: None,
            plan_revision: 0,
            subtasks: Vec::new(),
            next_subtask_index: 0,
            subtask_results: Vec::new(),
            success_criteria: None,
            feedback: None,
            side_effects_requested: false,
            side_effects_approved: false,
            user_side_effects_confirmed: Consent::Unset,
            user_input_needed: false,
            replan_needed: false,
            success_criteria_met: false,
            final_answer: None,
            pending_tool_calls: Vec::new(),
            failures: Vec::new(),
            aborted: None,
            phase: RunPhase::Idle,
            last_submission: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The subtask at the cursor.
    pub fn current_subtask(&self) -> Option<&Subtask> {
        self.subtasks.get(self.next_subtask_index)
    }

    /// Some subtask has not run yet.
    pub fn subtasks_remaining(&self) -> bool {
        self.next_subtask_index < self.subtasks.len()
    }

    /// Side effects were requested and not yet approved.
    pub fn approval_blocked(&self) -> bool {
        self.side_effects_requested && !self.side_effects_approved
    }

    /// A final answer has been produced.
    pub fn is_terminal(&self) -> bool {
        self.final_answer.is_some()
    }

    /// Scope of the subtask at the cursor.
    pub fn scope(&self) -> WorkScope {
        WorkScope {
            plan_revision: self.plan_revision,
            subtask_index: self.next_subtask_index,
        }
    }

    /// Messages produced while working on `scope`.
    pub fn scoped_messages(&self, scope: WorkScope) -> impl Iterator<Item = &Message> {
        self.transcript
            .iter()
            .filter(move |m| m.scope == Some(scope))
    }

    /// Most recent user message.
    pub fn latest_user_message(&self) -> Option<&Message> {
        self.transcript.iter().rev().find(|m| m.role == Role::User)
    }

    /// Position of the most recent approval request in the transcript.
    pub fn last_approval_request_at(&self) -> Option<usize> {
        self.transcript
            .iter()
            .rposition(|m| m.kind == MessageKind::ApprovalRequest)
    }

    /// The latest user message, if it arrived after the most recent approval
    /// request. Earlier messages never count as consent.
    pub fn reply_to_approval_request(&self) -> Option<&Message> {
        let asked_at = self.last_approval_request_at()?;
        let (pos, msg) = self
            .transcript
            .iter()
            .enumerate()
            .rev()
            .find(|(_, m)| m.role == Role::User)?;
        (pos > asked_at).then_some(msg)
    }

    /// Failures recorded for the current plan revision.
    pub fn current_failures(&self) -> impl Iterator<Item = &SubtaskFailure> {
        let revision = self.plan_revision;
        self.failures
            .iter()
            .filter(move |f| f.plan_revision == revision)
    }

    /// Caller-facing status derived from the flags.
    pub fn status(&self) -> RunStatus {
        if self.phase == RunPhase::Cancelled {
            RunStatus::Cancelled
        } else if self.is_terminal() {
            if self.aborted.is_some() {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            }
        } else if self.user_input_needed {
            RunStatus::WaitingForUser
        } else {
            RunStatus::Running
        }
    }

    /// Checks the invariants that hold at every stable point.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.next_subtask_index > self.subtasks.len() {
            return Err(format!(
                "next_subtask_index {} exceeds {} subtasks",
                self.next_subtask_index,
                self.subtasks.len()
            ));
        }
        if self.subtask_results.len() != self.next_subtask_index {
            return Err(format!(
                "{} results recorded for cursor {}",
                self.subtask_results.len(),
                self.next_subtask_index
            ));
        }
        if self.side_effects_approved && !self.side_effects_requested {
            return Err("side effects approved without a request".into());
        }
        if self.transcript.iter().any(|m| m.role == Role::System) {
            return Err("system messages are not stored in the transcript".into());
        }
        Ok(())
    }
}
