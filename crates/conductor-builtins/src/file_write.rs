use crate::sandbox::Sandbox;
use async_trait::async_trait;
use conductor_core::{ConductorResult, ToolCall, ToolResult};
use conductor_tools::{Tool, ToolDescriptor};
use tokio::io::AsyncWriteExt;
use tracing::info;

const MAX_WRITE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Writes a text file inside the sandbox, creating parent directories.
pub struct FileWriteTool {
    descriptor: ToolDescriptor,
    sandbox: Sandbox,
}

impl FileWriteTool {
    /// Tool bound to `sandbox`.
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "write_file".to_string(),
                description: "Write content to a file in the working directory.".to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path relative to the working directory"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content to write"
                        },
                        "append": {
                            "type": "boolean",
                            "description": "Append instead of overwriting (default: false)"
                        }
                    },
                    "required": ["path", "content"]
                }),
            },
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let path_str = call.arguments["path"].as_str().unwrap_or_default();
        let path = match self.sandbox.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(&call.id, e)),
        };
        let Some(content) = call.arguments["content"].as_str() else {
            return Ok(ToolResult::error(&call.id, "Missing 'content'"));
        };
        let append = call.arguments["append"].as_bool().unwrap_or(false);

        if content.len() > MAX_WRITE_SIZE {
            return Ok(ToolResult::error(
                &call.id,
                format!(
                    "Content too large: {} bytes (max: {MAX_WRITE_SIZE} bytes)",
                    content.len()
                ),
            ));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(path = %path.display(), bytes = content.len(), append, "Writing file");

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        Ok(ToolResult::success(
            &call.id,
            serde_json::json!({
                "path": self.sandbox.display(&path),
                "bytes_written": content.len(),
                "append": append,
            })
            .to_string(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall::new("w1", "write_file", args)
    }

    #[tokio::test]
    async fn writes_and_appends() {
        let tmp = TempDir::new().unwrap();
        let tool = FileWriteTool::new(Sandbox::new(tmp.path()));

        let first = tool
            .execute(call(serde_json::json!({"path": "out/r.md", "content": "a"})))
            .await
            .unwrap();
        assert!(!first.is_error);
        tool.execute(call(
            serde_json::json!({"path": "out/r.md", "content": "b", "append": true}),
        ))
        .await
        .unwrap();

        let text = std::fs::read_to_string(tmp.path().join("out/r.md")).unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn overwrite_truncates() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("r.md"), "old content").unwrap();
        let tool = FileWriteTool::new(Sandbox::new(tmp.path()));
        tool.execute(call(serde_json::json!({"path": "r.md", "content": "new"})))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("r.md")).unwrap(), "new");
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let tool = FileWriteTool::new(Sandbox::new(tmp.path()));
        let result = tool
            .execute(call(serde_json::json!({"path": "r.md"})))
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
