#![allow(clippy::unwrap_used, clippy::expect_used)]

use conductor_agent::{
    invoke_json, ModelConfig, OpenAiCompatibleProvider, ProviderKind, ReasoningProvider,
    RetryPolicy, RetryingProvider,
};
use conductor_core::{ConductorError, Message};
use serde::Deserialize;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct Plan {
    subtasks: Vec<String>,
}

fn fast_config(base: &str) -> ModelConfig {
    ModelConfig {
        provider: ProviderKind::Ollama,
        model_id: "local".into(),
        api_key: String::new(),
        api_base_url: Some(base.to_string()),
        temperature: 0.0,
        max_tokens: 128,
        json_mode: true,
        retry_policy: RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        },
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{"message": {"content": content}, "finish_reason": "stop"}]
    }))
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("{\"subtasks\": [\"read\", \"write\"]}"))
        .mount(&server)
        .await;

    let config = fast_config(&server.uri());
    let policy = config.retry_policy.clone();
    let backend: Arc<dyn ReasoningProvider> =
        Arc::new(OpenAiCompatibleProvider::new(config).unwrap());
    let provider = RetryingProvider::new(backend, policy);

    let plan: Plan = invoke_json(&provider, "plan", &[Message::user("do it")], 2)
        .await
        .unwrap();
    assert_eq!(plan.subtasks, vec!["read", "write"]);
}

#[tokio::test]
async fn bad_requests_fail_fast_as_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown model"))
        .expect(1)
        .mount(&server)
        .await;

    let config = fast_config(&server.uri());
    let policy = config.retry_policy.clone();
    let provider = RetryingProvider::new(
        Arc::new(OpenAiCompatibleProvider::new(config).unwrap()),
        policy,
    );

    let err = provider.invoke("sys", &[], &[]).await.unwrap_err();
    assert!(matches!(err, ConductorError::Provider(ref m) if m.contains("unknown model")));
}
