use crate::config::{ModelConfig, ProviderKind};
use crate::provider::{ProviderOutput, ReasoningProvider};
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, Message, Role, ToolCall};
use conductor_tools::ToolDescriptor;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other service
/// that implements the chat completions API.
pub struct OpenAiCompatibleProvider {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Client for the service `config` points at.
    pub fn new(config: ModelConfig) -> ConductorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConductorError::Http(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Model settings this client was built with.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn build_messages(&self, system_prompt: &str, messages: &[Message]) -> Vec<serde_json::Value> {
        let mut api_messages = vec![serde_json::json!({
            "role": "system",
            "content": system_prompt,
        })];
        // A "tool" message is only valid after the assistant turn that issued the call.
        let mut issued: HashSet<&str> = HashSet::new();

        for m in messages {
            match m.role {
                Role::System => continue,
                Role::User => api_messages.push(serde_json::json!({
                    "role": "user",
                    "content": m.content,
                })),
                Role::Assistant => {
                    let mut entry = serde_json::json!({
                        "role": "assistant",
                        "content": m.content,
                    });
                    if !m.tool_calls.is_empty() {
                        entry["tool_calls"] = serde_json::json!(m
                            .tool_calls
                            .iter()
                            .map(|tc| {
                                issued.insert(tc.id.as_str());
                                serde_json::json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.arguments.to_string(),
                                    }
                                })
                            })
                            .collect::<Vec<_>>());
                    }
                    api_messages.push(entry);
                }
                Role::Tool => match m.tool_call_id.as_deref() {
                    Some(id) if issued.contains(id) => api_messages.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": id,
                        "content": m.content,
                    })),
                    _ => api_messages.push(serde_json::json!({
                        "role": "user",
                        "content": format!(
                            "[{} output]\n{}",
                            m.name.as_deref().unwrap_or("tool"),
                            m.content
                        ),
                    })),
                },
            }
        }

        api_messages
    }

    fn build_tools(&self, tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        let request = if self.config.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        };

        // OpenRouter requires extra headers
        if matches!(self.config.provider, ProviderKind::OpenRouter) {
            request.header("X-Title", "Conductor")
        } else {
            request
        }
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiCompatibleProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> ConductorResult<ProviderOutput> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(system_prompt, conversation),
        });

        if tools.is_empty() {
            if self.config.json_mode {
                body["response_format"] = serde_json::json!({ "type": "json_object" });
            }
        } else {
            body["tools"] = serde_json::json!(self.build_tools(tools));
        }

        debug!(model = %self.config.model_id, tools = tools.len(), "Sending chat completion");

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConductorError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ConductorError::Http(format!(
                "OpenAI API error {status}: {error_body}"
            )));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ConductorError::Http(e.to_string()))?;

        parse_openai_response(&resp_body)
    }
}

/// Parses a chat completions response body.
pub fn parse_openai_response(body: &serde_json::Value) -> ConductorResult<ProviderOutput> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ConductorError::Provider(format!("Response has no choices: {body}")))?;

    let content = message["content"].as_str().unwrap_or_default().to_string();

    let tool_calls: Vec<ToolCall> = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let id = tc["id"].as_str()?.to_string();
                    let name = tc["function"]["name"].as_str()?.to_string();
                    let arguments: serde_json::Value =
                        serde_json::from_str(tc["function"]["arguments"].as_str()?)
                            .unwrap_or_default();
                    Some(ToolCall::new(id, name, arguments))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ProviderOutput::with_tool_calls(content, tool_calls))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use conductor_core::ToolResult;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> ModelConfig {
        ModelConfig {
            provider: ProviderKind::OpenAi,
            model_id: "test-model".into(),
            api_key: "sk-test".into(),
            api_base_url: Some(base.to_string()),
            temperature: 0.0,
            max_tokens: 256,
            json_mode: true,
            retry_policy: RetryPolicy::default(),
        }
    }

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn parses_tool_calls_with_string_arguments() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"path\":\"a.txt\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let out = parse_openai_response(&body).unwrap();
        assert!(out.content.is_empty());
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].arguments["path"], "a.txt");
    }

    #[test]
    fn missing_choices_is_provider_error() {
        let err = parse_openai_response(&serde_json::json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, ConductorError::Provider(_)));
    }

    #[test]
    fn orphan_tool_messages_become_user_text() {
        let provider = OpenAiCompatibleProvider::new(config("http://unused")).unwrap();
        let call = ToolCall::new("c1", "read_file", serde_json::json!({}));
        let conversation = vec![
            Message::user("go"),
            Message::tool_result("read_file", &ToolResult::success("c0", "stale")),
            Message::assistant("").with_tool_calls(vec![call]),
            Message::tool_result("read_file", &ToolResult::success("c1", "fresh")),
        ];
        let msgs = provider.build_messages("sys", &conversation);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[2]["role"], "user");
        assert!(msgs[2]["content"].as_str().unwrap().contains("stale"));
        assert_eq!(msgs[3]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(msgs[4]["role"], "tool");
        assert_eq!(msgs[4]["tool_call_id"], "c1");
    }

    #[tokio::test]
    async fn json_mode_request_without_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"ok\":true}"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new(config(&server.uri())).unwrap();
        let out = provider
            .invoke("judge", &[Message::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(out.content, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn tools_are_offered_as_functions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "tools": [{"type": "function", "function": {"name": "read_file"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "done"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new(config(&server.uri())).unwrap();
        let out = provider
            .invoke("work", &[Message::user("hi")], &[descriptor()])
            .await
            .unwrap();
        assert_eq!(out.content, "done");
    }

    #[tokio::test]
    async fn error_status_maps_to_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new(config(&server.uri())).unwrap();
        let err = provider.invoke("sys", &[], &[]).await.unwrap_err();
        match err {
            ConductorError::Http(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("slow down"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
