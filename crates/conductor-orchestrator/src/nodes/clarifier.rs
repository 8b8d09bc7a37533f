use super::say;
use crate::node::{Node, NodeName};
use crate::prompts::{self, CLARIFIER_PROMPT};
use async_trait::async_trait;
use conductor_agent::{invoke_json, ReasoningProvider};
use conductor_core::{ApprovalRequest, ConductorResult, Consent, Message, MessageKind};
use conductor_session::{RunState, StateDelta};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ClarifierReply {
    #[serde(default)]
    user_input_needed: bool,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    consent: Option<bool>,
}

const FALLBACK_QUESTION: &str = "Could you tell me a bit more about what you need?";

/// Asks the user for input when needed and reads approval answers.
pub struct ClarifierNode {
    provider: Arc<dyn ReasoningProvider>,
    parse_attempts: u32,
}

impl ClarifierNode {
    /// Clarifier backed by `provider`.
    pub fn new(provider: Arc<dyn ReasoningProvider>, parse_attempts: u32) -> Self {
        Self {
            provider,
            parse_attempts,
        }
    }

    fn context(state: &RunState) -> String {
        let latest = state
            .latest_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or("(no user message)");
        let reply = state
            .reply_to_approval_request()
            .map(|m| m.content.as_str())
            .unwrap_or("(none)");
        format!(
            "[CONVERSATION]\n{}\n\n[LATEST USER MESSAGE]\n{latest}\n\n\
             [APPROVAL]\nAwaiting approval: {}\nTools awaiting approval: {}\nReply to the approval request: {reply}\n\n\
             [EVALUATOR FEEDBACK]\n{}",
            prompts::format_conversation(&state.transcript),
            state.approval_blocked(),
            parked_tools(state).join(", "),
            state.feedback.as_deref().unwrap_or("(none)"),
        )
    }
}

fn parked_tools(state: &RunState) -> Vec<String> {
    state
        .pending_tool_calls
        .iter()
        .map(|c| c.name.clone())
        .collect()
}

#[async_trait]
impl Node for ClarifierNode {
    fn name(&self) -> NodeName {
        NodeName::Clarifier
    }

    async fn run(&self, state: &RunState) -> ConductorResult<StateDelta> {
        let reply: ClarifierReply = invoke_json(
            self.provider.as_ref(),
            CLARIFIER_PROMPT,
            &[Message::user(Self::context(state))],
            self.parse_attempts,
        )
        .await?;

        let mut delta = StateDelta::new();

        if state.approval_blocked() {
            // Only an answer given after the latest request, and not yet read, counts.
            let fresh_answer = state.user_side_effects_confirmed == Consent::Unset
                && state.reply_to_approval_request().is_some();
            let consent = if fresh_answer {
                Consent::from_answer(reply.consent)
            } else {
                Consent::Unset
            };

            if consent != Consent::Unset {
                info!(run_id = %state.run_id, consent = ?consent, "Consent extracted");
                delta.user_side_effects_confirmed = Some(consent);
                delta.user_input_needed = Some(false);
                return Ok(delta);
            }

            let subtask = state
                .current_subtask()
                .map(|s| s.description.clone())
                .unwrap_or_default();
            let question = reply
                .question
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| ApprovalRequest::new(subtask, parked_tools(state)).question());
            debug!(run_id = %state.run_id, "Asking for approval");
            delta.user_side_effects_confirmed = Some(Consent::Unset);
            delta.user_input_needed = Some(true);
            return Ok(delta.message(say(self.name(), MessageKind::ApprovalRequest, question)));
        }

        if reply.user_input_needed {
            let question = reply
                .question
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_QUESTION.to_string());
            delta.user_input_needed = Some(true);
            Ok(delta.message(say(self.name(), MessageKind::Question, question)))
        } else {
            delta.user_input_needed = Some(false);
            Ok(delta)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_agent::{ProviderOutput, ScriptedProvider};
    use conductor_core::ToolCall;
    use conductor_session::{Subtask, WorkerKind};
    use uuid::Uuid;

    fn node(reply: &str) -> ClarifierNode {
        ClarifierNode::new(Arc::new(ScriptedProvider::new(vec![ProviderOutput::text(reply)])), 1)
    }

    fn gated_state() -> RunState {
        let mut state = RunState::new(Uuid::new_v4());
        state.transcript.push(Message::user("write notes.txt, go ahead"));
        state.subtasks = vec![Subtask::new("write notes.txt", WorkerKind::Executor, true)];
        state.side_effects_requested = true;
        state.pending_tool_calls = vec![ToolCall::new("c1", "write_file", serde_json::json!({}))];
        state.transcript.push(
            say(NodeName::Executor, MessageKind::ApprovalRequest, "Requesting approval")
        );
        state
    }

    #[tokio::test]
    async fn asks_exactly_one_question() {
        let state = RunState::new(Uuid::new_v4());
        let delta = node(r#"{"user_input_needed": true, "question": "Which file?"}"#)
            .run(&state)
            .await
            .unwrap();
        assert_eq!(delta.user_input_needed, Some(true));
        assert_eq!(delta.transcript.len(), 1);
        assert_eq!(delta.transcript[0].kind, MessageKind::Question);
    }

    #[tokio::test]
    async fn no_input_needed_emits_nothing() {
        let state = RunState::new(Uuid::new_v4());
        let delta = node(r#"{"user_input_needed": false}"#).run(&state).await.unwrap();
        assert_eq!(delta.user_input_needed, Some(false));
        assert!(delta.transcript.is_empty());
    }

    #[tokio::test]
    async fn consent_before_request_is_ignored() {
        // The provider claims consent, but the only user message predates the request.
        let delta = node(r#"{"user_input_needed": false, "consent": true}"#)
            .run(&gated_state())
            .await
            .unwrap();
        assert_eq!(delta.user_side_effects_confirmed, Some(Consent::Unset));
        assert_eq!(delta.user_input_needed, Some(true));
        assert_eq!(delta.transcript[0].kind, MessageKind::ApprovalRequest);
        assert!(delta.transcript[0].content.contains("write_file"));
    }

    #[tokio::test]
    async fn reply_after_request_sets_consent() {
        let mut state = gated_state();
        state.transcript.push(Message::user("no, don't"));
        let delta = node(r#"{"user_input_needed": false, "consent": false}"#)
            .run(&state)
            .await
            .unwrap();
        assert_eq!(delta.user_side_effects_confirmed, Some(Consent::Declined));
        assert_eq!(delta.user_input_needed, Some(false));
        assert!(delta.transcript.is_empty());
    }

    #[tokio::test]
    async fn consumed_consent_is_asked_again() {
        let mut state = gated_state();
        state.transcript.push(Message::user("yes"));
        state.user_side_effects_confirmed = Consent::Granted;
        let delta = node(r#"{"user_input_needed": false, "consent": true, "question": "Still OK to overwrite notes.txt?"}"#)
            .run(&state)
            .await
            .unwrap();
        assert_eq!(delta.user_side_effects_confirmed, Some(Consent::Unset));
        assert_eq!(delta.transcript[0].content, "Still OK to overwrite notes.txt?");
    }
}
