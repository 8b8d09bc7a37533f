use crate::provider::{ProviderOutput, ReasoningProvider};
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, Message};
use conductor_tools::ToolDescriptor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Configures retry behaviour for transient provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Determines whether an error is transient and worth retrying.
///
/// Provider-level failures (malformed output, timeouts) are retried. HTTP
/// errors are retried for rate limits (429), timeouts and server errors
/// (500, 502, 503, 504), but not for 400-class client errors.
pub fn is_retryable(err: &ConductorError) -> bool {
    match err {
        ConductorError::Provider(_) | ConductorError::NodeTimeout { .. } => true,
        ConductorError::Http(msg) => {
            let lower = msg.to_lowercase();
            if lower.contains(" 400") || lower.contains(" 401") || lower.contains(" 403") {
                return false;
            }
            lower.contains("429")
                || lower.contains("timeout")
                || lower.contains("timed out")
                || lower.contains("connection")
                || lower.contains("500")
                || lower.contains("502")
                || lower.contains("503")
                || lower.contains("504")
        }
        _ => false,
    }
}

/// Computes the backoff delay for a given attempt using exponential backoff
/// capped at `backoff_max_ms`.
pub(crate) fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// Wraps a provider with exponential-backoff retries for transient errors.
///
/// Exhausted or non-retryable errors are surfaced as
/// [`ConductorError::Provider`] so callers see one failure class.
pub struct RetryingProvider {
    inner: Arc<dyn ReasoningProvider>,
    policy: RetryPolicy,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn ReasoningProvider>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl ReasoningProvider for RetryingProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> ConductorResult<ProviderOutput> {
        let mut last_err: Option<ConductorError> = None;

        for attempt in 0..=self.policy.max_retries {
            match self.inner.invoke(system_prompt, conversation, tools).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    if !is_retryable(&e) {
                        warn!(attempt, error = %e, "Non-retryable provider error");
                        last_err = Some(e);
                        break;
                    }
                    if attempt < self.policy.max_retries {
                        let delay = compute_backoff(&self.policy, attempt);
                        info!(
                            attempt,
                            delay_ms = delay,
                            error = %e,
                            "Retryable provider error, backing off"
                        );
                        self.do_sleep(delay).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(ConductorError::Provider(msg)) => ConductorError::Provider(msg),
            Some(other) => ConductorError::Provider(other.to_string()),
            None => ConductorError::Provider("provider retries exhausted".into()),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
