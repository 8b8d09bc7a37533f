use crate::tool::{Tool, ToolDescriptor};
use conductor_core::{ConductorError, ConductorResult, ToolCall, ToolResult};
use conductor_security::{SafetyClassifier, ToolSafety};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Central registry for all available tools.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Adds `tool`, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Tool registered as `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Descriptors in name order.
    pub fn list_descriptors(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// Descriptors of tools whose class is one of `allowed`.
    pub fn descriptors_with_safety(
        &self,
        classifier: &SafetyClassifier,
        allowed: &[ToolSafety],
    ) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|t| t.descriptor())
            .filter(|d| allowed.contains(&classifier.classify(&d.name)))
            .cloned()
            .collect()
    }

    /// Executes one call. Unknown tools are an error.
    pub async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ConductorError::ToolExecution {
                tool: call.name.clone(),
                reason: "unknown tool".into(),
            })?;
        tool.execute(call).await
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Named(ToolDescriptor);

    #[async_trait]
    impl Tool for Named {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.0
        }
        async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
            Ok(ToolResult::success(call.id, self.0.name.clone()))
        }
    }

    fn named(name: &str) -> Arc<dyn Tool> {
        Arc::new(Named(ToolDescriptor {
            name: name.into(),
            description: String::new(),
            parameters_schema: serde_json::json!({"type": "object"}),
        }))
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute(ToolCall::new("c1", "nope", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::ToolExecution { .. }));
    }

    #[test]
    fn safety_filtered_descriptors() {
        let mut registry = ToolRegistry::new();
        registry.register(named("read_file"));
        registry.register(named("write_file"));
        registry.register(named("mystery"));

        let classifier = SafetyClassifier::with_defaults();
        let read_only = registry.descriptors_with_safety(&classifier, &[ToolSafety::ReadOnly]);
        assert_eq!(read_only.len(), 1);
        assert_eq!(read_only[0].name, "read_file");
        assert_eq!(registry.tool_count(), 3);
    }
}
