use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, ToolCall, ToolResult};
use conductor_tools::{Tool, ToolDescriptor};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// The `[tools.search]` configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Search API endpoint. Requests are Serper-style JSON POSTs.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Sent as `X-API-KEY`. The tool is not registered while this is empty.
    #[serde(default)]
    pub api_key: String,
    /// Results returned when the caller does not ask for a number.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

fn default_endpoint() -> String {
    "https://google.serper.dev/search".to_string()
}

fn default_max_results() -> usize {
    5
}

const RESULT_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, rename = "answerBox")]
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// One entry of the tool's output.
#[derive(Debug, Serialize)]
struct Hit {
    title: String,
    url: String,
    snippet: String,
}

/// Web search for research through a Serper-compatible API.
pub struct WebSearchTool {
    descriptor: ToolDescriptor,
    client: reqwest::Client,
    config: SearchConfig,
}

impl WebSearchTool {
    /// Builds the HTTP client for `config`.
    pub fn new(config: SearchConfig) -> ConductorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ConductorError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            descriptor: ToolDescriptor {
                name: "web_search".to_string(),
                description: "Search the web and return the top results with title, URL and snippet."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query"
                        },
                        "num_results": {
                            "type": "integer",
                            "description": format!("How many results to return (max {RESULT_LIMIT})")
                        }
                    },
                    "required": ["query"]
                }),
            },
            client,
            config,
        })
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let query = call.arguments["query"].as_str().unwrap_or_default().trim();
        if query.is_empty() {
            return Ok(ToolResult::error(&call.id, "Empty query"));
        }
        let num = call.arguments["num_results"]
            .as_u64()
            .map_or(self.config.max_results, |n| n as usize)
            .clamp(1, RESULT_LIMIT);

        info!(query = %query, num, "Web search");

        let response = match self
            .client
            .post(&self.config.endpoint)
            .header("X-API-KEY", &self.config.api_key)
            .json(&serde_json::json!({ "q": query, "num": num }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(&call.id, format!("Search request failed: {e}"))),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Search API returned an error");
            return Ok(ToolResult::error(
                &call.id,
                format!("Search API error {}: {body}", status.as_u16()),
            ));
        }

        let parsed: SearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Unreadable search response: {e}"),
                ))
            }
        };

        let answer = parsed
            .answer_box
            .and_then(|b| b.answer.or(b.snippet))
            .filter(|a| !a.is_empty());
        let results: Vec<Hit> = parsed
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(num)
            .map(|r| Hit {
                title: r.title,
                url: r.link,
                snippet: r.snippet,
            })
            .collect();

        if results.is_empty() && answer.is_none() {
            return Ok(ToolResult::success(
                &call.id,
                format!("No results for '{query}'"),
            ));
        }
        let output = serde_json::json!({ "answer": answer, "results": results });
        Ok(ToolResult::success(&call.id, output.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_for(server: &MockServer) -> WebSearchTool {
        WebSearchTool::new(SearchConfig {
            endpoint: format!("{}/search", server.uri()),
            api_key: "test-key".into(),
            max_results: 2,
        })
        .unwrap()
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall::new("w1", "web_search", args)
    }

    #[tokio::test]
    async fn returns_top_results_and_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("X-API-KEY", "test-key"))
            .and(body_partial_json(serde_json::json!({"q": "capital of france", "num": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answerBox": {"answer": "Paris"},
                "organic": [
                    {"title": "Paris", "link": "https://en.wikipedia.org/wiki/Paris", "snippet": "Capital of France"},
                    {"title": "France", "link": "https://en.wikipedia.org/wiki/France", "snippet": "Country"},
                    {"title": "Extra", "link": "https://example.com", "snippet": "dropped"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .execute(call(serde_json::json!({"query": "capital of france"})))
            .await
            .unwrap();
        assert!(!result.is_error);
        let output: serde_json::Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(output["answer"], "Paris");
        let results = output["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["url"], "https://en.wikipedia.org/wiki/Paris");
    }

    #[tokio::test]
    async fn api_error_is_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .execute(call(serde_json::json!({"query": "anything"})))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("403"));
        assert!(result.content.contains("bad key"));
    }

    #[tokio::test]
    async fn empty_query_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .execute(call(serde_json::json!({"query": "  "})))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn no_hits_is_reported_plainly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"organic": []})))
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .execute(call(serde_json::json!({"query": "zzqx", "num_results": 50})))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.content.starts_with("No results"));
    }
}
