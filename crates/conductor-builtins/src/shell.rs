use crate::sandbox::Sandbox;
use async_trait::async_trait;
use conductor_core::{ConductorResult, ToolCall, ToolResult};
use conductor_tools::{Tool, ToolDescriptor};
use std::time::Duration;
use tracing::{info, warn};

const DANGEROUS_PATTERNS: &[&str] = &["rm -rf /", "mkfs", "dd if=", ":(){ :|:& };:", "sudo "];

/// Characters that let `sh -c` chain, substitute or redirect.
const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '$', '`', '<', '>', '(', ')', '\n', '\r'];

/// Runs a command with `sh -c` inside the sandbox directory.
///
/// When `allowed_commands` is non-empty, the first word of the command must
/// be one of them and the command may not contain shell metacharacters.
pub struct ShellTool {
    descriptor: ToolDescriptor,
    sandbox: Sandbox,
    allowed_commands: Vec<String>,
}

impl ShellTool {
    /// Tool running in the sandbox root, limited to `allowed_commands` when non-empty.
    pub fn new(sandbox: Sandbox, allowed_commands: Vec<String>) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "shell".to_string(),
                description: "Run a shell command in the working directory and return its output."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "The shell command to execute"
                        },
                        "timeout_secs": {
                            "type": "integer",
                            "description": "Timeout in seconds (default: 30, max: 300)",
                            "default": 30
                        }
                    },
                    "required": ["command"]
                }),
            },
            sandbox,
            allowed_commands,
        }
    }

    fn check(&self, command: &str) -> Result<(), String> {
        if let Some(pattern) = DANGEROUS_PATTERNS.iter().find(|p| command.contains(*p)) {
            return Err(format!("Command blocked: contains dangerous pattern '{pattern}'"));
        }
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(format!(
                "Command blocked: '{}' is not allowed with an allow-list",
                c.escape_default()
            ));
        }
        let program = command.split_whitespace().next().unwrap_or_default();
        if self.allowed_commands.iter().any(|c| c == program) {
            Ok(())
        } else {
            Err(format!("Command '{program}' is not in the allow-list"))
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ConductorResult<ToolResult> {
        let command = call.arguments["command"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if command.trim().is_empty() {
            return Ok(ToolResult::error(&call.id, "Empty command"));
        }
        if let Err(reason) = self.check(&command) {
            warn!(command = %command, "Blocked shell command");
            return Ok(ToolResult::error(&call.id, reason));
        }

        let timeout_secs = call.arguments["timeout_secs"]
            .as_u64()
            .unwrap_or(30)
            .min(300);

        info!(command = %command, timeout = timeout_secs, "Executing shell command");

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .current_dir(self.sandbox.root())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let response = serde_json::json!({
                    "exit_code": output.status.code().unwrap_or(-1),
                    "stdout": truncate_output(&stdout, 50_000),
                    "stderr": truncate_output(&stderr, 10_000),
                });
                if output.status.success() {
                    Ok(ToolResult::success(&call.id, response.to_string()))
                } else {
                    Ok(ToolResult::error(&call.id, response.to_string()))
                }
            }
            Ok(Err(e)) => Ok(ToolResult::error(
                &call.id,
                format!("Failed to execute command: {e}"),
            )),
            Err(_) => Ok(ToolResult::error(
                &call.id,
                format!("Command timed out after {timeout_secs}s"),
            )),
        }
    }
}

fn truncate_output(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut cut = max_len;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated, {} total bytes]", &s[..cut], s.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn call(command: &str) -> ToolCall {
        ToolCall::new("s1", "shell", serde_json::json!({"command": command}))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_sandbox_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "").unwrap();
        let tool = ShellTool::new(Sandbox::new(tmp.path()), vec![]);
        let result = tool.execute(call("ls")).await.unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("marker.txt"));
    }

    #[tokio::test]
    async fn blocks_dangerous_and_unlisted_commands() {
        let tmp = TempDir::new().unwrap();
        let tool = ShellTool::new(Sandbox::new(tmp.path()), vec!["echo".into()]);

        let dangerous = tool.execute(call("rm -rf /")).await.unwrap();
        assert!(dangerous.is_error);
        assert!(dangerous.content.contains("dangerous"));

        let unlisted = tool.execute(call("curl example.com")).await.unwrap();
        assert!(unlisted.is_error);
        assert!(unlisted.content.contains("allow-list"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn allow_listed_program_cannot_chain_commands() {
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("victim.txt");
        std::fs::write(&victim, "keep").unwrap();
        let tmp = TempDir::new().unwrap();
        let tool = ShellTool::new(Sandbox::new(tmp.path()), vec!["ls".into()]);

        for command in [
            format!("ls && rm {}", victim.display()),
            format!("ls; rm {}", victim.display()),
            format!("ls $(rm {})", victim.display()),
            format!("ls\nrm {}", victim.display()),
            "ls > listing.txt".to_string(),
        ] {
            let result = tool.execute(call(&command)).await.unwrap();
            assert!(result.is_error, "{command} should be blocked");
            assert!(result.content.contains("allow-list"));
        }
        assert!(victim.exists());
        assert!(!tmp.path().join("listing.txt").exists());

        let plain = tool.execute(call("ls -a")).await.unwrap();
        assert!(!plain.is_error);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let out = truncate_output("ééé", 3);
        assert!(out.starts_with('é'));
        assert!(out.contains("truncated"));
    }
}
