use super::say;
use crate::node::{Node, NodeName};
use crate::prompts::{self, EXECUTOR_PROMPT, RESEARCHER_PROMPT};
use async_trait::async_trait;
use chrono::Utc;
use conductor_agent::ReasoningProvider;
use conductor_core::{
    ApprovalRequest, ConductorError, ConductorResult, Consent, Message, MessageKind, ToolCall,
    ToolResult, WorkScope,
};
use conductor_security::{SafetyClassifier, ToolSafety};
use conductor_session::{RunState, StateDelta, Subtask, SubtaskFailure, WorkerKind};
use conductor_tools::{ToolDescriptor, ToolExecutor};
use std::sync::Arc;
use tracing::{info, warn};

/// Researcher or executor: works the subtask at the cursor one tool round
/// at a time.
pub struct WorkerNode {
    kind: WorkerKind,
    provider: Arc<dyn ReasoningProvider>,
    tools: ToolExecutor,
    classifier: Arc<SafetyClassifier>,
    max_tool_rounds: u32,
}

impl WorkerNode {
    /// Researcher: read-only tools, never gated.
    pub fn researcher(
        provider: Arc<dyn ReasoningProvider>,
        tools: ToolExecutor,
        classifier: Arc<SafetyClassifier>,
        max_tool_rounds: u32,
    ) -> Self {
        Self {
            kind: WorkerKind::Researcher,
            provider,
            tools,
            classifier,
            max_tool_rounds,
        }
    }

    /// Executor: every tool, gated by the classifier.
    pub fn executor(
        provider: Arc<dyn ReasoningProvider>,
        tools: ToolExecutor,
        classifier: Arc<SafetyClassifier>,
        max_tool_rounds: u32,
    ) -> Self {
        Self {
            kind: WorkerKind::Executor,
            provider,
            tools,
            classifier,
            max_tool_rounds,
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self.kind {
            WorkerKind::Researcher => RESEARCHER_PROMPT,
            _ => EXECUTOR_PROMPT,
        }
    }

    /// Tools shown to the provider: read-only ones for the researcher.
    fn offered_tools(&self) -> Vec<ToolDescriptor> {
        let registry = self.tools.registry();
        match self.kind {
            WorkerKind::Researcher => {
                registry.descriptors_with_safety(&self.classifier, &[ToolSafety::ReadOnly])
            }
            _ => registry.list_descriptors().into_iter().cloned().collect(),
        }
    }

    fn conversation(&self, state: &RunState, subtask: &Subtask, scope: WorkScope) -> Vec<Message> {
        let mut brief = format!("Current subtask:\n{}\n", subtask.description);
        if !state.subtask_results.is_empty() {
            brief.push_str(&format!(
                "\nResults from earlier subtasks:\n{}\n",
                prompts::bullets(&state.subtask_results)
            ));
        }
        let mut conversation = vec![Message::user(brief)];
        conversation.extend(state.scoped_messages(scope).cloned());
        conversation
    }

    /// Tool rounds already spent on the subtask at `scope`. A gated batch
    /// counts once, when it is parked.
    fn rounds_used(state: &RunState, scope: WorkScope) -> u32 {
        state
            .scoped_messages(scope)
            .filter(|m| !m.tool_calls.is_empty())
            .count() as u32
    }

    async fn execute_calls(
        &self,
        state: &RunState,
        subtask: &Subtask,
        scope: WorkScope,
        calls: &[ToolCall],
    ) -> StateDelta {
        let results = self.tools.run_all(calls).await;
        record_results(state, subtask, scope, calls, &results)
    }

    /// Researcher rounds: read-only calls run, anything else is refused.
    async fn research_round(
        &self,
        state: &RunState,
        subtask: &Subtask,
        scope: WorkScope,
        calls: Vec<ToolCall>,
    ) -> StateDelta {
        let (allowed, refused): (Vec<ToolCall>, Vec<ToolCall>) = calls
            .iter()
            .cloned()
            .partition(|c| self.classifier.classify(&c.name) == ToolSafety::ReadOnly);
        let ran = self.tools.run_all(&allowed).await;

        // Keep results in the order the provider asked for them.
        let mut results = Vec::with_capacity(calls.len());
        let mut ran = ran.into_iter();
        for call in &calls {
            if refused.iter().any(|r| r.id == call.id) {
                warn!(tool = %call.name, "Researcher asked for a non read-only tool");
                results.push(ToolResult::error(
                    call.id.clone(),
                    format!("Tool '{}' is not available to the researcher", call.name),
                ));
            } else if let Some(result) = ran.next() {
                results.push(result);
            }
        }
        record_results(state, subtask, scope, &calls, &results)
    }
}

/// Appends one tool message per call, plus failure evidence for errors.
fn record_results(
    state: &RunState,
    subtask: &Subtask,
    scope: WorkScope,
    calls: &[ToolCall],
    results: &[ToolResult],
) -> StateDelta {
    let mut delta = StateDelta::new();
    for (call, result) in calls.iter().zip(results) {
        if result.is_error {
            delta.failures.push(SubtaskFailure {
                plan_revision: state.plan_revision,
                subtask_index: state.next_subtask_index,
                subtask: subtask.description.clone(),
                tool: Some(call.name.clone()),
                reason: result.content.clone(),
                timestamp: Utc::now(),
            });
        }
        delta
            .transcript
            .push(Message::tool_result(call.name.clone(), result).with_scope(scope));
    }
    delta
}

/// Completes the subtask at the cursor with `result` and clears the
/// side-effect flags.
pub(crate) fn completion_delta(
    node: NodeName,
    state: &RunState,
    result: String,
    kind: MessageKind,
) -> StateDelta {
    let message = say(node, kind, result.clone()).with_scope(state.scope());
    StateDelta {
        subtask_results: vec![result],
        next_subtask_index: Some(state.next_subtask_index + 1),
        side_effects_requested: Some(false),
        side_effects_approved: Some(false),
        user_side_effects_confirmed: Some(Consent::Unset),
        pending_tool_calls: Some(Vec::new()),
        ..StateDelta::default()
    }
    .message(message)
}

/// Records a failed subtask and moves past it, so the evaluator can replan.
pub fn failure_delta(node: NodeName, state: &RunState, reason: &str) -> StateDelta {
    let description = state
        .current_subtask()
        .map(|s| s.description.clone())
        .unwrap_or_default();
    let mut delta = completion_delta(
        node,
        state,
        format!("FAILED: {description}: {reason}"),
        MessageKind::Failure,
    );
    delta.failures.push(SubtaskFailure {
        plan_revision: state.plan_revision,
        subtask_index: state.next_subtask_index,
        subtask: description,
        tool: None,
        reason: reason.to_string(),
        timestamp: Utc::now(),
    });
    delta
}

/// The subtask at the cursor, if `kind` owns it.
pub(crate) fn owned_subtask(
    node: NodeName,
    kind: WorkerKind,
    state: &RunState,
) -> ConductorResult<Subtask> {
    let subtask = state
        .current_subtask()
        .ok_or_else(|| ConductorError::MisroutedTask {
            node: node.to_string(),
            detail: format!(
                "no subtask at index {} of {}",
                state.next_subtask_index,
                state.subtasks.len()
            ),
        })?;
    if subtask.owner != kind {
        return Err(ConductorError::MisroutedTask {
            node: node.to_string(),
            detail: format!(
                "subtask {} \"{}\" belongs to {}",
                state.next_subtask_index, subtask.description, subtask.owner
            ),
        });
    }
    Ok(subtask.clone())
}

#[async_trait]
impl Node for WorkerNode {
    fn name(&self) -> NodeName {
        self.kind.into()
    }

    async fn run(&self, state: &RunState) -> ConductorResult<StateDelta> {
        let node = self.name();
        let subtask = owned_subtask(node, self.kind, state)?;
        let scope = state.scope();

        if state.side_effects_approved && !state.pending_tool_calls.is_empty() {
            info!(
                run_id = %state.run_id,
                calls = state.pending_tool_calls.len(),
                "Running approved tool calls"
            );
            let mut delta = self
                .execute_calls(state, &subtask, scope, &state.pending_tool_calls)
                .await;
            delta.pending_tool_calls = Some(Vec::new());
            return Ok(delta);
        }

        let output = self
            .provider
            .invoke(
                self.system_prompt(),
                &self.conversation(state, &subtask, scope),
                &self.offered_tools(),
            )
            .await?;

        if output.tool_calls.is_empty() {
            let summary = if output.content.trim().is_empty() {
                format!("Completed: {}", subtask.description)
            } else {
                output.content.trim().to_string()
            };
            info!(run_id = %state.run_id, node = %node, index = state.next_subtask_index, "Subtask completed");
            return Ok(completion_delta(node, state, summary, MessageKind::Chat));
        }

        let used = Self::rounds_used(state, scope);
        if used >= self.max_tool_rounds {
            warn!(run_id = %state.run_id, rounds = used, "Tool round budget exhausted");
            return Ok(failure_delta(
                node,
                state,
                &format!("stopped after {used} tool rounds without finishing"),
            ));
        }

        let calls = output.tool_calls;
        if self.kind == WorkerKind::Researcher {
            let request = say(node, MessageKind::Chat, output.content)
                .with_tool_calls(calls.clone())
                .with_scope(scope);
            let mut delta = StateDelta::new().message(request);
            let round = self.research_round(state, &subtask, scope, calls).await;
            delta.transcript.extend(round.transcript);
            delta.failures.extend(round.failures);
            return Ok(delta);
        }

        let gated: Vec<String> = calls
            .iter()
            .filter(|c| {
                self.classifier
                    .requires_approval(&c.name, subtask.requires_side_effects)
            })
            .map(|c| c.name.clone())
            .collect();

        if !gated.is_empty() && !state.side_effects_approved {
            let request = ApprovalRequest::new(subtask.description.clone(), gated);
            info!(
                run_id = %state.run_id,
                tools = ?request.tools,
                "Side effects need approval, parking tool calls"
            );
            let message = say(node, MessageKind::ApprovalRequest, request.describe())
                .with_tool_calls(calls.clone())
                .with_scope(scope);
            return Ok(StateDelta {
                side_effects_requested: Some(true),
                pending_tool_calls: Some(calls),
                ..StateDelta::default()
            }
            .message(message));
        }

        let request = say(node, MessageKind::Chat, output.content)
            .with_tool_calls(calls.clone())
            .with_scope(scope);
        let mut delta = StateDelta::new().message(request);
        let round = self.execute_calls(state, &subtask, scope, &calls).await;
        delta.transcript.extend(round.transcript);
        delta.failures.extend(round.failures);
        Ok(delta)
    }
}
