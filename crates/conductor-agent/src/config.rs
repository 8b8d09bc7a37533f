use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Which OpenAI-compatible service to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI.
    OpenAi,
    /// OpenRouter.
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible API.
    Groq,
    /// Local Ollama server.
    Ollama,
}

/// Model settings for one node or the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Service to talk to.
    pub provider: ProviderKind,
    /// Model name as the service knows it.
    pub model_id: String,
    /// Empty means "read from the environment".
    #[serde(default)]
    pub api_key: String,
    /// Overrides the service's default base URL.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on reply tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Ask the service for a JSON object reply when no tools are offered.
    #[serde(default = "default_json_mode")]
    pub json_mode: bool,
    /// Retries for transient failures.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_json_mode() -> bool {
    true
}

impl ModelConfig {
    /// Base URL requests go to.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                ProviderKind::OpenAi => "https://api.openai.com",
                ProviderKind::OpenRouter => "https://openrouter.ai/api",
                ProviderKind::Groq => "https://api.groq.com/openai",
                ProviderKind::Ollama => "http://localhost:11434",
            }
        }
    }
}
