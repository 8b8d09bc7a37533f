use conductor_agent::ModelConfig;
use conductor_builtins::BuiltinsConfig;
use conductor_orchestrator::{EngineConfig, NodeName};
use conductor_security::ToolSafety;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variables consulted, in order, when no API key is configured.
pub const API_KEY_VARS: [&str; 2] = ["CONDUCTOR_API_KEY", "OPENAI_API_KEY"];

/// Environment variable for the `web_search` key.
pub const SEARCH_KEY_VAR: &str = "SERPER_API_KEY";

/// Contents of `conductor.toml`.
#[derive(Debug, Deserialize)]
pub struct ConductorConfig {
    /// Model used by every node without its own entry in `nodes`.
    pub model: ModelConfig,
    /// Per-node model overrides.
    #[serde(default)]
    pub nodes: HashMap<NodeName, ModelConfig>,
    /// Engine limits.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Built-in tools.
    #[serde(default)]
    pub tools: BuiltinsConfig,
    /// Where runs are stored.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-tool classification overrides, e.g. `deploy = "irreversible"`.
    #[serde(default)]
    pub safety: HashMap<String, ToolSafety>,
}

/// Checkpoint backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One SQLite database.
    #[default]
    Sqlite,
    /// One JSON file per run.
    File,
}

/// The `[storage]` section.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Checkpoint backend.
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory for runs, transcripts and the audit log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl ConductorConfig {
    /// Reads `path` and fills missing API keys from the environment.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
        })?;
        let mut config: Self = toml::from_str(&raw)?;
        config.fill_api_keys(|var| std::env::var(var).ok());
        Ok(config)
    }

    /// Fills empty API keys from the first set variable in [`API_KEY_VARS`],
    /// and an empty search key from [`SEARCH_KEY_VAR`].
    pub fn fill_api_keys(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(search) = self.tools.search.as_mut().filter(|s| s.api_key.is_empty()) {
            if let Some(key) = lookup(SEARCH_KEY_VAR).filter(|v| !v.is_empty()) {
                search.api_key = key;
            }
        }
        let Some(key) = API_KEY_VARS
            .iter()
            .find_map(|var| lookup(var).filter(|v| !v.is_empty()))
        else {
            return;
        };
        for model in std::iter::once(&mut self.model).chain(self.nodes.values_mut()) {
            if model.api_key.is_empty() {
                model.api_key = key.clone();
            }
        }
    }
}
