use crate::sandbox::Sandbox;
use async_trait::async_trait;
use conductor_core::{ConductorResult, ToolCall, ToolResult};
use conductor_tools::{Tool, ToolDescriptor};
use tracing::info;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Reads a text file inside the sandbox.
pub struct FileReadTool {
    descriptor: ToolDescriptor,
    sandbox: Sandbox,
}

impl FileReadTool {
    /// Tool bound to `sandbox`.
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "read_file".to_string(),
                description: "Read the contents of a text file in the working directory."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path relative to the working directory"
                        },
                        "offset": {
                            "type": "integer",
                            "description": "Character offset to start reading from (default: 0)"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum characters to return (default: entire file)"
                        }
                    },
                    "required": ["path"]
                }),
            },
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let path_str = call.arguments["path"].as_str().unwrap_or_default();
        let path = match self.sandbox.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(&call.id, e)),
        };

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Cannot read '{path_str}': {e}"),
                ));
            }
        };
        if !metadata.is_file() {
            return Ok(ToolResult::error(
                &call.id,
                format!("'{path_str}' is not a file"),
            ));
        }
        if metadata.len() > MAX_FILE_SIZE {
            return Ok(ToolResult::error(
                &call.id,
                format!(
                    "File too large: {} bytes (max: {MAX_FILE_SIZE} bytes)",
                    metadata.len()
                ),
            ));
        }

        info!(path = %path.display(), size = metadata.len(), "Reading file");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("'{path_str}' is not readable as UTF-8 text: {e}"),
                ));
            }
        };

        let offset = call.arguments["offset"].as_u64().unwrap_or(0) as usize;
        let limit = call.arguments["limit"].as_u64().map(|l| l as usize);
        let slice: String = match limit {
            Some(limit) => content.chars().skip(offset).take(limit).collect(),
            None => content.chars().skip(offset).collect(),
        };

        Ok(ToolResult::success(&call.id, slice))
    }
}
