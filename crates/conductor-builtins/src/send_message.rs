use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, ToolCall, ToolResult};
use conductor_tools::{Tool, ToolDescriptor};
use std::time::Duration;
use tracing::info;

/// Sends a message to a person by POSTing JSON to a configured webhook.
///
/// Delivery cannot be taken back, so the tool is classified irreversible.
pub struct SendMessageTool {
    descriptor: ToolDescriptor,
    client: reqwest::Client,
    webhook_url: String,
}

impl SendMessageTool {
    /// Tool posting to `webhook_url`.
    pub fn new(webhook_url: impl Into<String>) -> ConductorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ConductorError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            descriptor: ToolDescriptor {
                name: "send_message".to_string(),
                description: "Send a text message to a recipient.".to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "to": {
                            "type": "string",
                            "description": "Recipient identifier"
                        },
                        "text": {
                            "type": "string",
                            "description": "Message body"
                        }
                    },
                    "required": ["to", "text"]
                }),
            },
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let to = call.arguments["to"].as_str().unwrap_or_default();
        let text = call.arguments["text"].as_str().unwrap_or_default();
        if to.is_empty() || text.is_empty() {
            return Ok(ToolResult::error(&call.id, "Both 'to' and 'text' are required"));
        }

        info!(to = %to, chars = text.len(), "Sending message");

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&serde_json::json!({"to": to, "text": text}))
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => {
                Ok(ToolResult::success(&call.id, format!("Message sent to {to}")))
            }
            Ok(r) => Ok(ToolResult::error(
                &call.id,
                format!("Webhook rejected message: {}", r.status()),
            )),
            Err(e) => Ok(ToolResult::error(&call.id, format!("Webhook unreachable: {e}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({"to": "ana", "text": "done"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let tool = SendMessageTool::new(server.uri()).unwrap();
        let result = tool
            .execute(ToolCall::new(
                "m1",
                "send_message",
                serde_json::json!({"to": "ana", "text": "done"}),
            ))
            .await
            .unwrap();
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn rejected_delivery_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let tool = SendMessageTool::new(server.uri()).unwrap();
        let result = tool
            .execute(ToolCall::new(
                "m1",
                "send_message",
                serde_json::json!({"to": "ana", "text": "hi"}),
            ))
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
