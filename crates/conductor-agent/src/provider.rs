use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, Message, ToolCall};
use conductor_tools::ToolDescriptor;
use serde::de::DeserializeOwned;
use tracing::warn;

/// What a provider returned for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOutput {
    /// Free text of the reply.
    pub content: String,
    /// Tools the model asked to run.
    pub tool_calls: Vec<ToolCall>,
}

impl ProviderOutput {
    /// A reply with text only.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A reply that asks for tool calls.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }
}

/// The reasoning collaborator behind every node.
///
/// Implementations must be stateless with respect to runs: everything a call
/// needs is in its arguments.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Sends one turn and returns the model's reply.
    async fn invoke(
        &self,
        system_prompt: &str,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> ConductorResult<ProviderOutput>;
}

/// Pulls the first JSON object out of `content`, tolerating code fences and
/// surrounding prose.
pub fn extract_json<T: DeserializeOwned>(content: &str) -> ConductorResult<T> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str(&trimmed[s..=e])
            .map_err(|err| ConductorError::Provider(format!("Malformed JSON reply: {err}"))),
        _ => Err(ConductorError::Provider(format!(
            "Reply contains no JSON object: {}",
            truncate(trimmed, 200)
        ))),
    }
}

/// Invokes the provider and parses its reply as `T`, retrying malformed
/// replies up to `attempts` times.
pub async fn invoke_json<T: DeserializeOwned>(
    provider: &dyn ReasoningProvider,
    system_prompt: &str,
    conversation: &[Message],
    attempts: u32,
) -> ConductorResult<T> {
    invoke_json_with(provider, system_prompt, conversation, attempts, |_: &T| Ok(())).await
}

/// Like [`invoke_json`], additionally retrying replies rejected by `validate`.
/// The rejection reason is fed back to the provider on the next attempt.
pub async fn invoke_json_with<T, F>(
    provider: &dyn ReasoningProvider,
    system_prompt: &str,
    conversation: &[Message],
    attempts: u32,
    validate: F,
) -> ConductorResult<T>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Result<(), String>,
{
    let mut conversation = conversation.to_vec();
    let mut last_err = ConductorError::Provider("no attempts made".into());

    for attempt in 0..attempts.max(1) {
        let output = provider.invoke(system_prompt, &conversation, &[]).await?;
        let problem = match extract_json::<T>(&output.content) {
            Ok(parsed) => match validate(&parsed) {
                Ok(()) => return Ok(parsed),
                Err(reason) => reason,
            },
            Err(e) => e.to_string(),
        };
        warn!(attempt, problem = %problem, "Rejected provider reply");
        conversation.push(Message::assistant(output.content));
        conversation.push(Message::user(format!(
            "Your previous reply was rejected: {problem}. Reply again with a single valid JSON object."
        )));
        last_err = ConductorError::Provider(problem);
    }

    Err(last_err)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedProvider;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        ok: bool,
    }

    #[test]
    fn extracts_fenced_json() {
        let v: Verdict = extract_json("Sure!\n```json\n{\"ok\": true}\n```").unwrap();
        assert!(v.ok);
    }

    #[test]
    fn no_json_is_provider_error() {
        let err = extract_json::<Verdict>("I refuse").unwrap_err();
        assert!(matches!(err, ConductorError::Provider(_)));
    }

    #[tokio::test]
    async fn malformed_reply_is_retried_with_feedback() {
        let provider = ScriptedProvider::new(vec![
            ProviderOutput::text("not json"),
            ProviderOutput::text("{\"ok\": false}"),
        ]);
        let v: Verdict = invoke_json(&provider, "judge", &[Message::user("go")], 3)
            .await
            .unwrap();
        assert!(!v.ok);
        assert_eq!(provider.call_count(), 2);
        let second = &provider.calls()[1];
        assert!(second.conversation.last().unwrap().content.contains("rejected"));
    }

    #[tokio::test]
    async fn validation_failures_exhaust_attempts() {
        let provider = ScriptedProvider::new(vec![
            ProviderOutput::text("{\"ok\": false}"),
            ProviderOutput::text("{\"ok\": false}"),
        ]);
        let err = invoke_json_with(&provider, "judge", &[], 2, |v: &Verdict| {
            if v.ok {
                Ok(())
            } else {
                Err("must be ok".to_string())
            }
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("must be ok"));
        assert_eq!(provider.call_count(), 2);
    }
}
