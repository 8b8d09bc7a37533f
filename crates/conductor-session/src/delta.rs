use crate::state::{RunPhase, RunState, SubmissionRecord, Subtask, SubtaskFailure};
use chrono::Utc;
use conductor_core::{Consent, Message, ToolCall};

/// A partial update to a [`RunState`].
///
/// Merge rules per field:
/// - `transcript`, `subtask_results` and `failures` are appended;
/// - plain `Option` fields overwrite only when `Some`;
/// - `Option<Option<_>>` fields can also clear (`Some(None)`);
/// - `plan`, `subtasks`, `next_subtask_index` and `pending_tool_calls` are
///   replaced wholesale. A new `subtasks` list discards existing results
///   before the delta's own results are appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    /// Messages to append.
    pub transcript: Vec<Message>,
    /// Results to append.
    pub subtask_results: Vec<String>,
    /// Failures to append.
    pub failures: Vec<SubtaskFailure>,
    /// Drop recorded failures before appending.
    pub reset_failures: bool,
    /// New plan text.
    pub plan: Option<Option<String>>,
    /// New plan revision.
    pub plan_revision: Option<u32>,
    /// New subtask list.
    pub subtasks: Option<Vec<Subtask>>,
    /// New cursor.
    pub next_subtask_index: Option<usize>,
    /// New success criteria.
    pub success_criteria: Option<Option<String>>,
    /// New evaluator feedback.
    pub feedback: Option<Option<String>>,
    /// Side effects were requested.
    pub side_effects_requested: Option<bool>,
    /// Side effects were approved.
    pub side_effects_approved: Option<bool>,
    /// User consent.
    pub user_side_effects_confirmed: Option<Consent>,
    /// The user must be asked.
    pub user_input_needed: Option<bool>,
    /// A new plan is needed.
    pub replan_needed: Option<bool>,
    /// The success criteria are met.
    pub success_criteria_met: Option<bool>,
    /// New final answer.
    pub final_answer: Option<Option<String>>,
    /// New parked tool calls.
    pub pending_tool_calls: Option<Vec<ToolCall>>,
    /// New abort reason.
    pub aborted: Option<Option<String>>,
    /// New phase.
    pub phase: Option<RunPhase>,
    /// New keyed submission record.
    pub last_submission: Option<SubmissionRecord>,
}

impl StateDelta {
    /// Empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transcript message.
    pub fn message(mut self, msg: Message) -> Self {
        self.transcript.push(msg);
        self
    }

    /// Sets the phase.
    pub fn phase(mut self, phase: RunPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Marks the run as fatally failed.
    pub fn abort(mut self, reason: impl Into<String>) -> Self {
        self.aborted = Some(Some(reason.into()));
        self
    }

    /// Resets everything except the transcript so a finished run can take a
    /// new request.
    pub fn new_cycle() -> Self {
        Self {
            reset_failures: true,
            plan: Some(None),
            subtasks: Some(Vec::new()),
            next_subtask_index: Some(0),
            success_criteria: Some(None),
            feedback: Some(None),
            side_effects_requested: Some(false),
            side_effects_approved: Some(false),
            user_side_effects_confirmed: Some(Consent::Unset),
            user_input_needed: Some(false),
            replan_needed: Some(false),
            success_criteria_met: Some(false),
            final_answer: Some(None),
            pending_tool_calls: Some(Vec::new()),
            aborted: Some(None),
            phase: Some(RunPhase::Idle),
            ..Self::default()
        }
    }

    /// Whether merging would change nothing but the timestamp.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges this delta into `state`.
    pub fn apply_to(self, state: &mut RunState) {
        state.transcript.extend(self.transcript);

        if let Some(plan) = self.plan {
            state.plan = plan;
        }
        if let Some(revision) = self.plan_revision {
            state.plan_revision = revision;
        }
        if let Some(subtasks) = self.subtasks {
            state.subtasks = subtasks;
            state.subtask_results.clear();
        }
        state.subtask_results.extend(self.subtask_results);
        if let Some(index) = self.next_subtask_index {
            state.next_subtask_index = index;
        }

        if self.reset_failures {
            state.failures.clear();
        }
        state.failures.extend(self.failures);

        if let Some(criteria) = self.success_criteria {
            state.success_criteria = criteria;
        }
        if let Some(feedback) = self.feedback {
            state.feedback = feedback;
        }
        if let Some(v) = self.side_effects_requested {
            state.side_effects_requested = v;
        }
        if let Some(v) = self.side_effects_approved {
            state.side_effects_approved = v;
        }
        if let Some(v) = self.user_side_effects_confirmed {
            state.user_side_effects_confirmed = v;
        }
        if let Some(v) = self.user_input_needed {
            state.user_input_needed = v;
        }
        if let Some(v) = self.replan_needed {
            state.replan_needed = v;
        }
        if let Some(v) = self.success_criteria_met {
            state.success_criteria_met = v;
        }
        if let Some(answer) = self.final_answer {
            state.final_answer = answer;
        }
        if let Some(calls) = self.pending_tool_calls {
            state.pending_tool_calls = calls;
        }
        if let Some(aborted) = self.aborted {
            state.aborted = aborted;
        }
        if let Some(phase) = self.phase {
            state.phase = phase;
        }
        if let Some(record) = self.last_submission {
            state.last_submission = Some(record);
        }

        state.updated_at = Utc::now();
    }
}
