use crate::provider::{ProviderOutput, ReasoningProvider};
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, Message};
use conductor_tools::ToolDescriptor;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

type Responder =
    Box<dyn Fn(&str, &[Message]) -> ConductorResult<ProviderOutput> + Send + Sync>;

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// System prompt sent.
    pub system_prompt: String,
    /// Conversation sent.
    pub conversation: Vec<Message>,
    /// Names of the tools offered.
    pub tools: Vec<String>,
}

/// Provider that replays a fixed script of outputs in order.
///
/// Once the script runs out it falls back to the responder, if one is set,
/// and otherwise fails with a provider error.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ConductorResult<ProviderOutput>>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    /// Replays `outputs` in order.
    pub fn new(outputs: Vec<ProviderOutput>) -> Self {
        Self::from_results(outputs.into_iter().map(Ok).collect())
    }

    /// Replays `results`, errors included.
    pub fn from_results(results: Vec<ConductorResult<ProviderOutput>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            responder: None,
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A provider that always answers with the same text.
    pub fn repeating(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new(Vec::new()).with_responder(move |_, _| Ok(ProviderOutput::text(content.clone())))
    }

    /// Answers computed from the prompt and conversation once the script is empty.
    pub fn with_responder(
        mut self,
        responder: impl Fn(&str, &[Message]) -> ConductorResult<ProviderOutput> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Sleeps before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Appends an output to the script.
    pub fn push(&self, output: ProviderOutput) {
        self.script.lock().push_back(Ok(output));
    }

    /// Number of invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every invocation so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Outputs not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> ConductorResult<ProviderOutput> {
        self.calls.lock().push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            conversation: conversation.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(result) => result,
            None => match &self.responder {
                Some(responder) => responder(system_prompt, conversation),
                None => Err(ConductorError::Provider("script exhausted".into())),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_then_falls_back() {
        let provider = ScriptedProvider::new(vec![ProviderOutput::text("first")])
            .with_responder(|_, conv| Ok(ProviderOutput::text(format!("{} msgs", conv.len()))));

        let a = provider.invoke("s", &[], &[]).await.unwrap();
        let b = provider
            .invoke("s", &[Message::user("x")], &[])
            .await
            .unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "1 msgs");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_is_provider_error() {
        let provider = ScriptedProvider::new(vec![]);
        let err = provider.invoke("s", &[], &[]).await.unwrap_err();
        assert!(matches!(err, ConductorError::Provider(_)));
    }
}
