use super::say;
use crate::node::{Node, NodeName};
use crate::prompts::{self, FINALIZER_PROMPT};
use async_trait::async_trait;
use conductor_agent::{invoke_json_with, ReasoningProvider};
use conductor_core::{ConductorResult, Consent, Message, MessageKind};
use conductor_session::{RunState, StateDelta};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct FinalReply {
    final_answer: String,
}

/// Writes the single user-facing answer. Always succeeds.
pub struct FinalizerNode {
    provider: Arc<dyn ReasoningProvider>,
    parse_attempts: u32,
}

impl FinalizerNode {
    /// Finalizer backed by `provider`.
    pub fn new(provider: Arc<dyn ReasoningProvider>, parse_attempts: u32) -> Self {
        Self {
            provider,
            parse_attempts,
        }
    }

    fn context(state: &RunState) -> String {
        let consent = match state.user_side_effects_confirmed {
            Consent::Granted => "approved",
            Consent::Declined => "declined",
            Consent::Unset if state.side_effects_requested => "not provided",
            Consent::Unset => "not needed",
        };
        format!(
            "[FINAL STATE]\nPlan: {}\nSuccess criteria: {}\nResults:\n{}\nSuccess criteria met: {}\n\
             User consent to side effects: {consent}\nFeedback: {}",
            state.plan.as_deref().unwrap_or("(none)"),
            state.success_criteria.as_deref().unwrap_or("(none)"),
            prompts::bullets(&state.subtask_results),
            state.success_criteria_met,
            state.feedback.as_deref().unwrap_or("(none)"),
        )
    }
}

/// Final answer built from state alone.
pub fn fallback_answer(state: &RunState) -> String {
    if let Some(reason) = &state.aborted {
        return format!("Sorry, the task could not be completed: {reason}");
    }
    if state.success_criteria_met {
        return format!(
            "The task is complete.\n{}",
            prompts::bullets(&state.subtask_results)
        );
    }
    if state.side_effects_requested {
        return match state.user_side_effects_confirmed {
            Consent::Declined => {
                "Understood. You declined the requested actions, so the task will not proceed."
                    .to_string()
            }
            _ => "The task did not proceed because the required approval was not provided."
                .to_string(),
        };
    }
    match &state.feedback {
        Some(feedback) => format!("Sorry, the task could not be completed. {feedback}"),
        None => "Sorry, the task could not be completed.".to_string(),
    }
}

/// Delta that ends the run with `answer`.
pub fn closing_delta(answer: String) -> StateDelta {
    StateDelta {
        final_answer: Some(Some(answer.clone())),
        user_input_needed: Some(false),
        ..StateDelta::default()
    }
    .message(say(NodeName::Finalizer, MessageKind::FinalAnswer, answer))
}

#[async_trait]
impl Node for FinalizerNode {
    fn name(&self) -> NodeName {
        NodeName::Finalizer
    }

    async fn run(&self, state: &RunState) -> ConductorResult<StateDelta> {
        if state.aborted.is_some() {
            return Ok(closing_delta(fallback_answer(state)));
        }

        let answer = match invoke_json_with(
            self.provider.as_ref(),
            FINALIZER_PROMPT,
            &[Message::user(Self::context(state))],
            self.parse_attempts,
            |r: &FinalReply| {
                if r.final_answer.trim().is_empty() {
                    Err("the final answer is empty".to_string())
                } else {
                    Ok(())
                }
            },
        )
        .await
        {
            Ok(reply) => reply.final_answer,
            Err(e) => {
                warn!(run_id = %state.run_id, error = %e, "Finalizer provider failed, using fallback");
                fallback_answer(state)
            }
        };
        Ok(closing_delta(answer))
    }
}
