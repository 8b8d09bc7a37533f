use crate::registry::ToolRegistry;
use conductor_core::{ToolCall, ToolResult};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runs tool calls concurrently, each under its own timeout.
///
/// Every call yields exactly one [`ToolResult`]; failures and timeouts are
/// converted to error results so callers can record them as evidence.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    /// Executor over `registry`, each call limited to `timeout`.
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Tools this executor runs.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Executes one call.
    pub async fn run(&self, call: ToolCall) -> ToolResult {
        let call_id = call.id.clone();
        let name = call.name.clone();
        info!(tool = %name, call_id = %call_id, "Executing tool");

        match tokio::time::timeout(self.timeout, self.registry.execute(call)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool failed");
                ToolResult::error(call_id, e.to_string())
            }
            Err(_) => {
                warn!(tool = %name, timeout_ms = self.timeout.as_millis() as u64, "Tool timed out");
                ToolResult::error(
                    call_id,
                    format!("Tool '{name}' timed out after {}ms", self.timeout.as_millis()),
                )
            }
        }
    }

    /// Fans out `calls` and joins them. Results are in call order.
    pub async fn run_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().cloned().map(|call| self.run(call))).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tool::{Tool, ToolDescriptor};
    use async_trait::async_trait;
    use conductor_core::{ConductorError, ConductorResult};
    use std::time::Instant;

    struct Sleepy {
        descriptor: ToolDescriptor,
        millis: u64,
    }

    #[async_trait]
    impl Tool for Sleepy {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }
        async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
            tokio::time::sleep(Duration::from_millis(self.millis)).await;
            if call.arguments["fail"].as_bool().unwrap_or(false) {
                return Err(ConductorError::ToolExecution {
                    tool: self.descriptor.name.clone(),
                    reason: "asked to fail".into(),
                });
            }
            Ok(ToolResult::success(call.id, format!("slept {}", self.millis)))
        }
    }

    fn executor(millis: u64, timeout_ms: u64) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Sleepy {
            descriptor: ToolDescriptor {
                name: "sleep".into(),
                description: "sleeps".into(),
                parameters_schema: serde_json::json!({"type": "object"}),
            },
            millis,
        }));
        ToolExecutor::new(Arc::new(registry), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn calls_run_concurrently_and_keep_order() {
        let exec = executor(100, 1_000);
        let calls: Vec<ToolCall> = (0..5)
            .map(|i| ToolCall::new(format!("c{i}"), "sleep", serde_json::json!({})))
            .collect();

        let started = Instant::now();
        let results = exec.run_all(&calls).await;
        assert!(started.elapsed() < Duration::from_millis(450));

        let ids: Vec<&str> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4"]);
        assert!(results.iter().all(|r| !r.is_error));
    }

    #[tokio::test]
    async fn timeout_becomes_error_result() {
        let exec = executor(500, 20);
        let result = exec
            .run(ToolCall::new("c1", "sleep", serde_json::json!({})))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("timed out"));
    }

    #[tokio::test]
    async fn failures_and_unknown_tools_become_error_results() {
        let exec = executor(0, 1_000);
        let results = exec
            .run_all(&[
                ToolCall::new("c1", "sleep", serde_json::json!({"fail": true})),
                ToolCall::new("c2", "missing", serde_json::json!({})),
            ])
            .await;
        assert!(results[0].is_error);
        assert!(results[0].content.contains("asked to fail"));
        assert!(results[1].is_error);
        assert!(results[1].content.contains("unknown tool"));
    }
}
