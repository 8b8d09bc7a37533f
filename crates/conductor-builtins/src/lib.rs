//! Built-in tools for Conductor workers.
//!
//! File tools are confined to a [`Sandbox`] root. Each tool's name matches
//! an entry of the default safety table in `conductor-security`.
//!
//! # Main entry points
//!
//! - [`register_builtins()`]: Register the standard tool set from a [`BuiltinsConfig`].

/// Listing, search, delete, move and copy tools.
pub mod file_ops;
/// File read tool.
pub mod file_read;
/// File write tool.
pub mod file_write;
/// HTTP GET tool.
pub mod http_fetch;
/// Path confinement.
pub mod sandbox;
/// Webhook message tool.
pub mod send_message;
/// Shell command tool.
pub mod shell;
/// Web search tool.
pub mod web_search;

pub use file_ops::{FileDeleteTool, FileSearchTool, ListDirectoryTool, TransferFileTool};
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use http_fetch::HttpFetchTool;
pub use sandbox::Sandbox;
pub use send_message::SendMessageTool;
pub use shell::ShellTool;
pub use web_search::{SearchConfig, WebSearchTool};

use conductor_core::ConductorResult;
use conductor_tools::ToolRegistry;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// The `[tools]` configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuiltinsConfig {
    /// Directory the file and shell tools operate in.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Programs the shell tool may start. Empty allows any non-blocked command.
    #[serde(default)]
    pub shell_allowlist: Vec<String>,
    /// Register the `shell` tool.
    #[serde(default = "default_true")]
    pub enable_shell: bool,
    /// Register the `http_fetch` tool.
    #[serde(default = "default_true")]
    pub enable_http: bool,
    /// Let `http_fetch` reach loopback and private networks.
    #[serde(default)]
    pub allow_private_hosts: bool,
    /// Webhook for `send_message`; the tool is not registered without one.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Search API for `web_search`; the tool is not registered without one.
    #[serde(default)]
    pub search: Option<SearchConfig>,
}

impl Default for BuiltinsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            shell_allowlist: Vec::new(),
            enable_shell: true,
            enable_http: true,
            allow_private_hosts: false,
            webhook_url: None,
            search: None,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_true() -> bool {
    true
}

/// Register the built-in tools described by `config`.
pub fn register_builtins(registry: &mut ToolRegistry, config: &BuiltinsConfig) -> ConductorResult<()> {
    let sandbox = Sandbox::new(config.root.clone());

    registry.register(Arc::new(FileReadTool::new(sandbox.clone())));
    registry.register(Arc::new(FileWriteTool::new(sandbox.clone())));
    registry.register(Arc::new(ListDirectoryTool::new(sandbox.clone())));
    registry.register(Arc::new(FileSearchTool::new(sandbox.clone())));
    registry.register(Arc::new(FileDeleteTool::new(sandbox.clone())));
    registry.register(Arc::new(TransferFileTool::move_file(sandbox.clone())));
    registry.register(Arc::new(TransferFileTool::copy_file(sandbox.clone())));

    if config.enable_shell {
        registry.register(Arc::new(ShellTool::new(
            sandbox,
            config.shell_allowlist.clone(),
        )));
    }
    if config.enable_http {
        registry.register(Arc::new(HttpFetchTool::new(config.allow_private_hosts)?));
    }
    if let Some(url) = &config.webhook_url {
        registry.register(Arc::new(SendMessageTool::new(url.clone())?));
    }
    match &config.search {
        Some(search) if search.api_key.is_empty() => {
            warn!("Search API key missing, web_search is not registered");
        }
        Some(search) => registry.register(Arc::new(WebSearchTool::new(search.clone())?)),
        None => {}
    }

    info!(count = registry.tool_count(), root = %config.root.display(), "Built-in tools registered");
    Ok(())
}
