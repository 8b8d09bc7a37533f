use super::say;
use crate::node::{Node, NodeName};
use crate::prompts::{self, PLANNER_PROMPT};
use async_trait::async_trait;
use conductor_agent::{invoke_json_with, ReasoningProvider};
use conductor_core::{ConductorResult, Consent, Message, MessageKind};
use conductor_session::{RunState, StateDelta, Subtask, WorkerKind};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct PlannedSubtask {
    #[serde(alias = "task")]
    description: String,
    #[serde(alias = "assigned_to")]
    owner: String,
    #[serde(default)]
    requires_side_effects: bool,
}

#[derive(Debug, Deserialize)]
struct PlannerReply {
    plan: String,
    subtasks: Vec<PlannedSubtask>,
    success_criteria: String,
}

/// Produces the plan, subtasks and success criteria.
pub struct PlannerNode {
    provider: Arc<dyn ReasoningProvider>,
    parse_attempts: u32,
}

impl PlannerNode {
    /// Planner backed by `provider`.
    pub fn new(provider: Arc<dyn ReasoningProvider>, parse_attempts: u32) -> Self {
        Self {
            provider,
            parse_attempts,
        }
    }

    fn context(state: &RunState) -> String {
        let mut text = format!(
            "[CONVERSATION]\n{}\n",
            prompts::format_conversation(&state.transcript)
        );
        if state.replan_needed {
            let previous: Vec<String> = state
                .subtasks
                .iter()
                .map(|s| format!("{} ({})", s.description, s.owner))
                .collect();
            let failures: Vec<String> = state
                .current_failures()
                .map(|f| match &f.tool {
                    Some(tool) => format!("\"{}\": {tool} failed: {}", f.subtask, f.reason),
                    None => format!("\"{}\": {}", f.subtask, f.reason),
                })
                .collect();
            text.push_str(&format!(
                "\n[REPLANNING]\nThe previous plan failed. Do not repeat it; address the failures directly.\n\
                 Feedback: {}\nPrevious subtasks:\n{}\nFailures:\n{}\n",
                state.feedback.as_deref().unwrap_or("(none)"),
                prompts::bullets(&previous),
                prompts::bullets(&failures),
            ));
        }
        text.push_str("\nProduce the plan, subtasks and success criteria.");
        text
    }
}

fn to_subtasks(reply: &PlannerReply) -> Result<Vec<Subtask>, String> {
    if reply.subtasks.is_empty() {
        return Err("the plan has no subtasks".into());
    }
    reply
        .subtasks
        .iter()
        .map(|s| {
            let owner = WorkerKind::parse(&s.owner).ok_or_else(|| {
                format!(
                    "unknown owner '{}'; use researcher, executor or summarizer",
                    s.owner
                )
            })?;
            if s.description.trim().is_empty() {
                return Err("a subtask has an empty description".to_string());
            }
            Ok(Subtask::new(s.description.trim(), owner, s.requires_side_effects))
        })
        .collect()
}

fn same_steps(a: &[Subtask], b: &[Subtask]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.owner == y.owner && x.description.eq_ignore_ascii_case(&y.description))
}

#[async_trait]
impl Node for PlannerNode {
    fn name(&self) -> NodeName {
        NodeName::Planner
    }

    async fn run(&self, state: &RunState) -> ConductorResult<StateDelta> {
        let replanning = state.replan_needed;
        let reply: PlannerReply = invoke_json_with(
            self.provider.as_ref(),
            PLANNER_PROMPT,
            &[Message::user(Self::context(state))],
            self.parse_attempts,
            |reply: &PlannerReply| {
                let subtasks = to_subtasks(reply)?;
                if replanning && same_steps(&subtasks, &state.subtasks) {
                    return Err("the new plan repeats the plan that just failed".into());
                }
                Ok(())
            },
        )
        .await?;
        let subtasks = to_subtasks(&reply).map_err(conductor_core::ConductorError::Provider)?;

        let revision = state.plan_revision + 1;
        info!(
            run_id = %state.run_id,
            revision,
            subtasks = subtasks.len(),
            replanning,
            "Plan produced"
        );

        let steps: Vec<String> = subtasks
            .iter()
            .map(|s| format!("{} ({})", s.description, s.owner))
            .collect();
        let announcement = format!("Plan: {}\n{}", reply.plan, prompts::bullets(&steps));

        Ok(StateDelta {
            plan: Some(Some(reply.plan)),
            plan_revision: Some(revision),
            subtasks: Some(subtasks),
            next_subtask_index: Some(0),
            success_criteria: Some(Some(reply.success_criteria)),
            feedback: Some(None),
            replan_needed: Some(false),
            success_criteria_met: Some(false),
            user_input_needed: Some(false),
            side_effects_requested: Some(false),
            side_effects_approved: Some(false),
            user_side_effects_confirmed: Some(Consent::Unset),
            pending_tool_calls: Some(Vec::new()),
            reset_failures: true,
            ..StateDelta::default()
        }
        .message(say(self.name(), MessageKind::Chat, announcement)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_agent::{ProviderOutput, ScriptedProvider};
    use uuid::Uuid;

    const PLAN: &str = r#"{"plan": "look it up", "subtasks": [{"description": "Find the capital of France", "owner": "researcher"}], "success_criteria": "Capital named"}"#;

    #[tokio::test]
    async fn plan_resets_cursor_and_bumps_revision() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderOutput::text(PLAN)]));
        let mut state = RunState::new(Uuid::new_v4());
        state.transcript.push(Message::user("What is the capital of France?"));
        state.feedback = Some("old".into());

        let delta = PlannerNode::new(provider, 2).run(&state).await.unwrap();
        delta.apply_to(&mut state);

        assert_eq!(state.plan_revision, 1);
        assert_eq!(state.next_subtask_index, 0);
        assert_eq!(state.subtasks[0].owner, WorkerKind::Researcher);
        assert!(state.feedback.is_none());
        assert!(state.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn unknown_owner_is_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderOutput::text(
                r#"{"plan": "p", "subtasks": [{"description": "judge", "owner": "evaluator"}], "success_criteria": "c"}"#,
            ),
            ProviderOutput::text(PLAN),
        ]));
        let state = RunState::new(Uuid::new_v4());
        let delta = PlannerNode::new(provider.clone(), 3).run(&state).await.unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(delta.subtasks.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replanning_rejects_identical_plan_and_shows_failures() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderOutput::text(PLAN),
            ProviderOutput::text(
                r#"{"plan": "read notes", "subtasks": [{"task": "Read notes.md for the capital", "assigned_to": "researcher"}], "success_criteria": "Capital named"}"#,
            ),
        ]));
        let mut state = RunState::new(Uuid::new_v4());
        state.subtasks = vec![Subtask::new("Find the capital of France", WorkerKind::Researcher, false)];
        state.subtask_results = vec!["failed".into()];
        state.next_subtask_index = 1;
        state.plan_revision = 1;
        state.replan_needed = true;
        state.failures.push(conductor_session::SubtaskFailure {
            plan_revision: 1,
            subtask_index: 0,
            subtask: "Find the capital of France".into(),
            tool: Some("web_search".into()),
            reason: "timed out".into(),
            timestamp: chrono::Utc::now(),
        });

        let delta = PlannerNode::new(provider.clone(), 3).run(&state).await.unwrap();
        assert_eq!(provider.call_count(), 2);
        let first_prompt = &provider.calls()[0].conversation[0].content;
        assert!(first_prompt.contains("web_search failed: timed out"));
        assert!(provider.calls()[1]
            .conversation
            .last()
            .unwrap()
            .content
            .contains("repeats the plan"));

        delta.apply_to(&mut state);
        assert_eq!(state.plan_revision, 2);
        assert!(state.failures.is_empty());
        assert!(!state.replan_needed);
        assert!(state.check_invariants().is_ok());
    }
}
