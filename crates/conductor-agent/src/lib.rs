//! Reasoning providers for Conductor nodes.
//!
//! # Main types
//!
//! - [`ReasoningProvider`]: The contract every node talks to.
//! - [`ProviderOutput`]: Text plus any requested tool calls.
//! - [`RetryingProvider`]: Exponential-backoff wrapper for transient failures.
//! - [`OpenAiCompatibleProvider`]: Chat-completions backend.
//! - [`ScriptedProvider`]: Replays canned outputs, for tests and offline runs.

/// HTTP backends.
pub mod backends;
/// Model configuration.
pub mod config;
/// Provider trait and JSON reply helpers.
pub mod provider;
/// Retry with backoff.
pub mod retry;
/// Scripted provider for tests and offline runs.
pub mod scripted;

pub use backends::openai::OpenAiCompatibleProvider;
pub use config::{ModelConfig, ProviderKind};
pub use provider::{extract_json, invoke_json, invoke_json_with, ProviderOutput, ReasoningProvider};
pub use retry::{is_retryable, RetryPolicy, RetryingProvider};
pub use scripted::ScriptedProvider;
