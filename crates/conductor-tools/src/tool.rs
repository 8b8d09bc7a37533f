use async_trait::async_trait;
use conductor_core::{ConductorResult, ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// Metadata describing a tool's interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name the model calls the tool by.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters_schema: serde_json::Value,
}

/// Trait that all tools implement.
///
/// Expected failures (bad arguments, missing files) are reported as
/// [`ToolResult::error`]; `Err` is reserved for failures of the tool itself.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and argument schema.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Runs one call. Tool-level failures are error results, not `Err`.
    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult>;
}
