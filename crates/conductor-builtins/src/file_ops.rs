//! Directory listing, search and file management tools.

use crate::sandbox::Sandbox;
use async_trait::async_trait;
use conductor_core::{ConductorResult, ToolCall, ToolResult};
use conductor_tools::{Tool, ToolDescriptor};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::info;

const MAX_SEARCH_RESULTS: usize = 200;

fn descriptor(name: &str, description: &str, schema: serde_json::Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        parameters_schema: schema,
    }
}

fn path_arg<'a>(call: &'a ToolCall, key: &str) -> &'a str {
    call.arguments[key].as_str().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// list_directory
// ---------------------------------------------------------------------------

/// `list_directory`: entries of a sandbox directory.
pub struct ListDirectoryTool {
    descriptor: ToolDescriptor,
    sandbox: Sandbox,
}

impl ListDirectoryTool {
    /// Tool bound to `sandbox`.
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            descriptor: descriptor(
                "list_directory",
                "List the entries of a directory in the working directory.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Directory relative to the working directory (default: .)"
                        }
                    }
                }),
            ),
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let requested = match path_arg(&call, "path") {
            "" => ".",
            p => p,
        };
        let dir = match self.sandbox.resolve(requested) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(&call.id, e)),
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Cannot list '{requested}': {e}"),
                ));
            }
        };

        let mut listing = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let mut name = entry.file_name().to_string_lossy().to_string();
            if is_dir {
                name.push('/');
            }
            listing.push(name);
        }
        listing.sort();

        Ok(ToolResult::success(&call.id, listing.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// file_search
// ---------------------------------------------------------------------------

/// `file_search`: regex search over file names and contents.
pub struct FileSearchTool {
    descriptor: ToolDescriptor,
    sandbox: Sandbox,
}

impl FileSearchTool {
    /// Tool bound to `sandbox`.
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            descriptor: descriptor(
                "file_search",
                "Recursively find files whose name matches a regular expression.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "description": "Regular expression matched against file names"
                        },
                        "path": {
                            "type": "string",
                            "description": "Directory to search (default: .)"
                        }
                    },
                    "required": ["pattern"]
                }),
            ),
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for FileSearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let pattern = match Regex::new(path_arg(&call, "pattern")) {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(&call.id, format!("Invalid pattern: {e}"))),
        };
        let start = match path_arg(&call, "path") {
            "" => ".",
            p => p,
        };
        let root = match self.sandbox.resolve(start) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(&call.id, e)),
        };

        let mut matches = Vec::new();
        let mut pending: Vec<PathBuf> = vec![root];
        while let Some(dir) = pending.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let Ok(kind) = entry.file_type().await else {
                    continue;
                };
                if kind.is_dir() {
                    pending.push(path);
                } else if pattern.is_match(&entry.file_name().to_string_lossy()) {
                    matches.push(self.sandbox.display(&path));
                }
            }
            if matches.len() >= MAX_SEARCH_RESULTS {
                break;
            }
        }
        matches.sort();
        matches.truncate(MAX_SEARCH_RESULTS);

        Ok(ToolResult::success(&call.id, matches.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// file_delete
// ---------------------------------------------------------------------------

/// `file_delete`: removes a file inside the sandbox.
pub struct FileDeleteTool {
    descriptor: ToolDescriptor,
    sandbox: Sandbox,
}

impl FileDeleteTool {
    /// Tool bound to `sandbox`.
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            descriptor: descriptor(
                "file_delete",
                "Delete a file in the working directory.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File to delete"}
                    },
                    "required": ["path"]
                }),
            ),
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for FileDeleteTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let requested = path_arg(&call, "path");
        let path = match self.sandbox.resolve(requested) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(&call.id, e)),
        };
        if path == self.sandbox.root() {
            return Ok(ToolResult::error(&call.id, "Refusing to delete the working directory"));
        }
        info!(path = %path.display(), "Deleting file");
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(ToolResult::success(&call.id, format!("Deleted {requested}"))),
            Err(e) => Ok(ToolResult::error(
                &call.id,
                format!("Cannot delete '{requested}': {e}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// move_file / copy_file
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Transfer {
    Move,
    Copy,
}

/// Moves or copies a file between two sandbox paths.
pub struct TransferFileTool {
    descriptor: ToolDescriptor,
    sandbox: Sandbox,
    mode: Transfer,
}

impl TransferFileTool {
    fn with_mode(sandbox: Sandbox, mode: Transfer) -> Self {
        let (name, description) = match mode {
            Transfer::Move => ("move_file", "Move or rename a file in the working directory."),
            Transfer::Copy => ("copy_file", "Copy a file in the working directory."),
        };
        Self {
            descriptor: descriptor(
                name,
                description,
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "source": {"type": "string", "description": "Existing file"},
                        "destination": {"type": "string", "description": "Target path"}
                    },
                    "required": ["source", "destination"]
                }),
            ),
            sandbox,
            mode,
        }
    }

    /// The `move_file` tool.
    pub fn move_file(sandbox: Sandbox) -> Self {
        Self::with_mode(sandbox, Transfer::Move)
    }

    /// The `copy_file` tool.
    pub fn copy_file(sandbox: Sandbox) -> Self {
        Self::with_mode(sandbox, Transfer::Copy)
    }

    async fn transfer(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match self.mode {
            Transfer::Move => tokio::fs::rename(from, to).await,
            Transfer::Copy => tokio::fs::copy(from, to).await.map(|_| ()),
        }
    }
}

#[async_trait]
impl Tool for TransferFileTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let source = path_arg(&call, "source");
        let destination = path_arg(&call, "destination");
        let (from, to) = match (self.sandbox.resolve(source), self.sandbox.resolve(destination)) {
            (Ok(f), Ok(t)) => (f, t),
            (Err(e), _) | (_, Err(e)) => return Ok(ToolResult::error(&call.id, e)),
        };

        info!(
            tool = %self.descriptor.name,
            from = %from.display(),
            to = %to.display(),
            "Transferring file"
        );
        match self.transfer(&from, &to).await {
            Ok(()) => Ok(ToolResult::success(
                &call.id,
                format!("{source} -> {destination}"),
            )),
            Err(e) => Ok(ToolResult::error(
                &call.id,
                format!("{} failed: {e}", self.descriptor.name),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new("f1", name, args)
    }

    #[tokio::test]
    async fn list_marks_directories() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        let tool = ListDirectoryTool::new(Sandbox::new(tmp.path()));
        let result = tool
            .execute(call("list_directory", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(result.content, "a/\nb.txt");
    }

    #[tokio::test]
    async fn search_finds_nested_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("x/y")).unwrap();
        std::fs::write(tmp.path().join("x/y/report.md"), "").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "").unwrap();
        let tool = FileSearchTool::new(Sandbox::new(tmp.path()));
        let result = tool
            .execute(call("file_search", serde_json::json!({"pattern": r"\.md$"})))
            .await
            .unwrap();
        assert_eq!(result.content, "x/y/report.md");
    }

    #[tokio::test]
    async fn move_copy_delete() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "data").unwrap();
        let sandbox = Sandbox::new(tmp.path());

        TransferFileTool::copy_file(sandbox.clone())
            .execute(call(
                "copy_file",
                serde_json::json!({"source": "a.txt", "destination": "b/a.txt"}),
            ))
            .await
            .unwrap();
        TransferFileTool::move_file(sandbox.clone())
            .execute(call(
                "move_file",
                serde_json::json!({"source": "a.txt", "destination": "c.txt"}),
            ))
            .await
            .unwrap();
        assert!(tmp.path().join("b/a.txt").exists());
        assert!(tmp.path().join("c.txt").exists());
        assert!(!tmp.path().join("a.txt").exists());

        let deleted = FileDeleteTool::new(sandbox)
            .execute(call("file_delete", serde_json::json!({"path": "c.txt"})))
            .await
            .unwrap();
        assert!(!deleted.is_error);
        assert!(!tmp.path().join("c.txt").exists());
    }

    #[tokio::test]
    async fn transfer_out_of_sandbox_is_denied() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "data").unwrap();
        let result = TransferFileTool::copy_file(Sandbox::new(tmp.path()))
            .execute(call(
                "copy_file",
                serde_json::json!({"source": "a.txt", "destination": "../a.txt"}),
            ))
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
