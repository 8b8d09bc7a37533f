use super::worker::{completion_delta, owned_subtask};
use crate::node::{Node, NodeName};
use crate::prompts::{self, SUMMARIZER_PROMPT};
use async_trait::async_trait;
use conductor_agent::{invoke_json_with, ReasoningProvider};
use conductor_core::{ConductorResult, Message, MessageKind};
use conductor_session::{RunState, StateDelta, WorkerKind};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct SummaryReply {
    summary: String,
}

/// Condenses earlier subtask results into a report fragment.
pub struct SummarizerNode {
    provider: Arc<dyn ReasoningProvider>,
    parse_attempts: u32,
}

impl SummarizerNode {
    /// Summarizer backed by `provider`.
    pub fn new(provider: Arc<dyn ReasoningProvider>, parse_attempts: u32) -> Self {
        Self {
            provider,
            parse_attempts,
        }
    }
}

#[async_trait]
impl Node for SummarizerNode {
    fn name(&self) -> NodeName {
        NodeName::Summarizer
    }

    async fn run(&self, state: &RunState) -> ConductorResult<StateDelta> {
        let subtask = owned_subtask(self.name(), WorkerKind::Summarizer, state)?;
        let brief = format!(
            "[RESULTS]\n{}\n\n[SUBTASK]\n{}",
            prompts::bullets(&state.subtask_results),
            subtask.description
        );
        let reply: SummaryReply = invoke_json_with(
            self.provider.as_ref(),
            SUMMARIZER_PROMPT,
            &[Message::user(brief)],
            self.parse_attempts,
            |r: &SummaryReply| {
                if r.summary.trim().is_empty() {
                    Err("the summary is empty".to_string())
                } else {
                    Ok(())
                }
            },
        )
        .await?;

        Ok(completion_delta(
            self.name(),
            state,
            reply.summary.trim().to_string(),
            MessageKind::Chat,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_agent::{ProviderOutput, ScriptedProvider};
    use conductor_session::Subtask;
    use uuid::Uuid;

    #[tokio::test]
    async fn empty_summary_is_rejected_then_accepted() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderOutput::text(r#"{"summary": "  "}"#),
            ProviderOutput::text(r#"{"summary": "Paris is the capital; population 2.1M."}"#),
        ]));
        let mut state = RunState::new(Uuid::new_v4());
        state.subtasks = vec![
            Subtask::new("capital", WorkerKind::Researcher, false),
            Subtask::new("population", WorkerKind::Researcher, false),
            Subtask::new("report", WorkerKind::Summarizer, false),
        ];
        state.subtask_results = vec!["Paris".into(), "2.1M".into()];
        state.next_subtask_index = 2;

        let node = SummarizerNode::new(provider.clone(), 2);
        node.run(&state).await.unwrap().apply_to(&mut state);

        assert_eq!(provider.call_count(), 2);
        assert!(provider.calls()[0].conversation[0].content.contains("- Paris"));
        assert_eq!(state.next_subtask_index, 3);
        assert_eq!(state.subtask_results.len(), 3);
        assert!(state.check_invariants().is_ok());
    }
}
