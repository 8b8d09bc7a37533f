use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts and budgets of the superstep loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock budget of one node invocation.
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,
    /// Budget of one tool call.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Node invocations allowed in one superstep before the run is aborted.
    #[serde(default = "default_max_steps")]
    pub max_steps_per_superstep: u32,
    /// Tool rounds a worker may spend on one subtask.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Attempts at getting a well-formed JSON reply from a provider.
    #[serde(default = "default_parse_attempts")]
    pub parse_attempts: u32,
}

fn default_node_timeout_secs() -> u64 {
    120
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_steps() -> u32 {
    50
}

fn default_max_tool_rounds() -> u32 {
    8
}

fn default_parse_attempts() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout_secs: default_node_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_steps_per_superstep: default_max_steps(),
            max_tool_rounds: default_max_tool_rounds(),
            parse_attempts: default_parse_attempts(),
        }
    }
}

impl EngineConfig {
    /// Per-node time limit.
    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    /// Per-tool-call time limit.
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}
