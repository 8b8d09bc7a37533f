use super::say;
use crate::node::{Node, NodeName};
use crate::prompts::{self, EVALUATOR_PROMPT};
use async_trait::async_trait;
use conductor_agent::{invoke_json, ReasoningProvider};
use conductor_core::{ConductorResult, Consent, Message, MessageKind};
use conductor_session::{RunState, StateDelta};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
struct EvaluatorReply {
    feedback: String,
    #[serde(default)]
    success_criteria_met: bool,
    #[serde(default)]
    user_input_needed: bool,
    #[serde(default)]
    side_effects_approved: Option<bool>,
    #[serde(default)]
    replan_needed: bool,
}

/// The evaluator's decision after the hard rules have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Parked side effects may run.
    pub side_effects_approved: bool,
    /// The success criteria are met.
    pub success_criteria_met: bool,
    /// The user must be asked before going on.
    pub user_input_needed: bool,
    /// The planner should try a new plan.
    pub replan_needed: bool,
}

impl Verdict {
    /// Overrides the provider's judgment where state alone decides.
    ///
    /// Approval needs both the provider's assent and the user's explicit
    /// consent. A blocked approval always fails the criteria and asks the
    /// user. Replanning is only possible once every subtask has run.
    pub fn enforce(
        state: &RunState,
        provider_approves: Option<bool>,
        criteria_met: bool,
        input_needed: bool,
        replan: bool,
    ) -> Self {
        let requested = state.side_effects_requested;
        let approved = requested
            && state.user_side_effects_confirmed == Consent::Granted
            && provider_approves.unwrap_or(false);
        let blocked = requested && !approved;
        let remaining = state.subtasks_remaining();

        let user_input_needed = if blocked {
            true
        } else if remaining {
            false
        } else {
            input_needed
        };

        Self {
            side_effects_approved: approved,
            success_criteria_met: criteria_met && !blocked,
            user_input_needed,
            replan_needed: replan && !remaining && !user_input_needed,
        }
    }
}

/// Judges safety, quality and whether to replan.
pub struct EvaluatorNode {
    provider: Arc<dyn ReasoningProvider>,
    parse_attempts: u32,
}

impl EvaluatorNode {
    /// Evaluator backed by `provider`.
    pub fn new(provider: Arc<dyn ReasoningProvider>, parse_attempts: u32) -> Self {
        Self {
            provider,
            parse_attempts,
        }
    }

    fn context(state: &RunState) -> String {
        let recent_start = state.transcript.len().saturating_sub(4);
        let failures: Vec<String> = state
            .current_failures()
            .map(|f| format!("{}: {}", f.subtask, f.reason))
            .collect();
        let pending: Vec<String> = state
            .pending_tool_calls
            .iter()
            .map(|c| format!("{} {}", c.name, c.arguments))
            .collect();
        format!(
            "[EXECUTION STATUS]\nTotal subtasks: {}\nNext subtask index: {}\nAll subtasks completed: {}\n\n\
             [SUCCESS CRITERIA]\n{}\n\n[RESULTS]\n{}\n\n[FAILURES]\n{}\n\n\
             [RECENT CONTEXT]\n{}\n\n[SAFETY]\nSide effects requested: {}\nPending tool calls:\n{}\nUser consent: {:?}",
            state.subtasks.len(),
            state.next_subtask_index,
            !state.subtasks.is_empty() && !state.subtasks_remaining(),
            state.success_criteria.as_deref().unwrap_or("(none)"),
            prompts::bullets(&state.subtask_results),
            prompts::bullets(&failures),
            prompts::format_conversation(&state.transcript[recent_start..]),
            state.side_effects_requested,
            prompts::bullets(&pending),
            state.user_side_effects_confirmed,
        )
    }
}

#[async_trait]
impl Node for EvaluatorNode {
    fn name(&self) -> NodeName {
        NodeName::Evaluator
    }

    async fn run(&self, state: &RunState) -> ConductorResult<StateDelta> {
        let reply: EvaluatorReply = invoke_json(
            self.provider.as_ref(),
            EVALUATOR_PROMPT,
            &[Message::user(Self::context(state))],
            self.parse_attempts,
        )
        .await?;

        let verdict = Verdict::enforce(
            state,
            reply.side_effects_approved,
            reply.success_criteria_met,
            reply.user_input_needed,
            reply.replan_needed,
        );
        info!(
            run_id = %state.run_id,
            approved = verdict.side_effects_approved,
            met = verdict.success_criteria_met,
            input = verdict.user_input_needed,
            replan = verdict.replan_needed,
            "Evaluation"
        );

        Ok(StateDelta {
            feedback: Some(Some(reply.feedback.clone())),
            side_effects_approved: Some(verdict.side_effects_approved),
            success_criteria_met: Some(verdict.success_criteria_met),
            user_input_needed: Some(verdict.user_input_needed),
            replan_needed: Some(verdict.replan_needed),
            ..StateDelta::default()
        }
        .message(say(self.name(), MessageKind::Feedback, reply.feedback)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_agent::{ProviderOutput, ScriptedProvider};
    use conductor_session::{Subtask, WorkerKind};
    use uuid::Uuid;

    fn two_step_state(done: usize) -> RunState {
        let mut state = RunState::new(Uuid::new_v4());
        state.subtasks = vec![
            Subtask::new("look", WorkerKind::Researcher, false),
            Subtask::new("write", WorkerKind::Executor, true),
        ];
        for _ in 0..done {
            state.subtask_results.push("ok".into());
        }
        state.next_subtask_index = done;
        state
    }

    #[test]
    fn requested_without_consent_blocks() {
        let mut state = two_step_state(1);
        state.side_effects_requested = true;
        for consent in [Consent::Unset, Consent::Declined] {
            state.user_side_effects_confirmed = consent;
            let v = Verdict::enforce(&state, Some(true), true, false, true);
            assert!(!v.side_effects_approved);
            assert!(!v.success_criteria_met);
            assert!(v.user_input_needed);
            assert!(!v.replan_needed);
        }
    }

    #[test]
    fn consent_and_provider_together_approve() {
        let mut state = two_step_state(1);
        state.side_effects_requested = true;
        state.user_side_effects_confirmed = Consent::Granted;
        let v = Verdict::enforce(&state, Some(true), false, true, false);
        assert!(v.side_effects_approved);
        assert!(!v.user_input_needed);

        let vetoed = Verdict::enforce(&state, Some(false), false, false, false);
        assert!(!vetoed.side_effects_approved);
        assert!(vetoed.user_input_needed);

        let silent = Verdict::enforce(&state, None, false, false, false);
        assert!(!silent.side_effects_approved);
    }

    #[test]
    fn nothing_requested_is_never_approved() {
        let state = two_step_state(2);
        let v = Verdict::enforce(&state, Some(true), true, false, false);
        assert!(!v.side_effects_approved);
        assert!(v.success_criteria_met);
    }

    #[test]
    fn no_replan_while_subtasks_remain() {
        for done in 0..2 {
            let v = Verdict::enforce(&two_step_state(done), None, false, true, true);
            assert!(!v.replan_needed);
            assert!(!v.user_input_needed);
        }
        let finished = Verdict::enforce(&two_step_state(2), None, false, false, true);
        assert!(finished.replan_needed);
        let asking = Verdict::enforce(&two_step_state(2), None, false, true, true);
        assert!(!asking.replan_needed);
    }

    #[tokio::test]
    async fn feedback_is_recorded() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderOutput::text(
            r#"{"feedback": "Looks complete", "success_criteria_met": true, "user_input_needed": false, "replan_needed": false}"#,
        )]));
        let mut state = two_step_state(2);
        EvaluatorNode::new(provider, 1)
            .run(&state)
            .await
            .unwrap()
            .apply_to(&mut state);
        assert_eq!(state.feedback.as_deref(), Some("Looks complete"));
        assert!(state.success_criteria_met);
        assert_eq!(state.transcript[0].kind, MessageKind::Feedback);
        assert!(state.check_invariants().is_ok());
    }
}
