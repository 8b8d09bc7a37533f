use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, ToolCall, ToolResult};
use conductor_tools::{Tool, ToolDescriptor};
use std::time::Duration;
use tracing::info;

const MAX_RESPONSE_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// HTTP GET for research. Read-only by construction: no method or body
/// arguments are accepted.
pub struct HttpFetchTool {
    descriptor: ToolDescriptor,
    client: reqwest::Client,
    allow_private_hosts: bool,
}

impl HttpFetchTool {
    /// Builds the HTTP client.
    pub fn new(allow_private_hosts: bool) -> ConductorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ConductorError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            descriptor: ToolDescriptor {
                name: "http_fetch".to_string(),
                description: "Fetch the content of a URL with HTTP GET.".to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "The http(s) URL to fetch"
                        }
                    },
                    "required": ["url"]
                }),
            },
            client,
            allow_private_hosts,
        })
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let url = call.arguments["url"].as_str().unwrap_or_default();
        if url.is_empty() {
            return Ok(ToolResult::error(&call.id, "Empty URL"));
        }

        let parsed = match reqwest::Url::parse(url) {
            Ok(u) => u,
            Err(e) => return Ok(ToolResult::error(&call.id, format!("Invalid URL '{url}': {e}"))),
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return Ok(ToolResult::error(
                &call.id,
                format!("Unsupported scheme '{}'. Only http/https allowed.", parsed.scheme()),
            ));
        }
        if let Some(host) = parsed.host_str() {
            if !self.allow_private_hosts && is_private_host(host) {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Access denied: '{host}' is a private/internal address"),
                ));
            }
        }

        info!(url = %url, "HTTP fetch");

        let response = match self.client.get(parsed).send().await {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(&call.id, format!("HTTP request failed: {e}"))),
        };
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Failed to read response body: {e}"),
                ));
            }
        };
        if body.len() > MAX_RESPONSE_SIZE {
            return Ok(ToolResult::error(
                &call.id,
                format!(
                    "Response too large: {} bytes (max: {MAX_RESPONSE_SIZE} bytes)",
                    body.len()
                ),
            ));
        }

        let result = serde_json::json!({
            "status": status,
            "content_type": content_type,
            "body": String::from_utf8_lossy(&body),
        });
        if (200..400).contains(&status) {
            Ok(ToolResult::success(&call.id, result.to_string()))
        } else {
            Ok(ToolResult::error(&call.id, result.to_string()))
        }
    }
}

/// Check if a host is a private/internal network address (SSRF prevention).
pub(crate) fn is_private_host(host: &str) -> bool {
    const PRIVATE_PREFIXES: &[&str] = &[
        "localhost",
        "127.",
        "10.",
        "192.168.",
        "169.254.",
        "0.0.0.0",
        "[::1]",
        "::1",
        "metadata.google",
        "metadata.aws",
    ];
    let host = host.to_lowercase();
    if PRIVATE_PREFIXES.iter().any(|p| host.starts_with(p)) {
        return true;
    }
    // 172.16.0.0/12
    host.strip_prefix("172.")
        .and_then(|rest| rest.split('.').next())
        .and_then(|octet| octet.parse::<u8>().ok())
        .is_some_and(|octet| (16..=31).contains(&octet))
}
