use std::time::Duration;

use tracing::warn;

use crate::error::AgentError;
use crate::metrics::RunMetrics;
use crate::provider::ModelProvider;
use crate::types::ChatMessage;

/// Text returned to the orchestrator when every attempt failed. The loop
/// keeps running on a degraded turn; total model failure surfaces as a task
/// failure, not a crash.
pub const MODEL_FAILURE_SENTINEL: &str = "Error: failed to get a response from the model.";

/// Exponential backoff: `unit * 2^retry_count`.
pub fn backoff_delay(unit: Duration, retry_count: u32) -> Duration {
    unit * 2u32.saturating_pow(retry_count)
}

/// Sends the running conversation to the provider, retrying with exponential
/// backoff. Every attempt counts as an API call, retries included.
pub struct ModelInvoker {
    provider: Box<dyn ModelProvider>,
    max_retries: u32,
    backoff_unit: Duration,
}

impl ModelInvoker {
    pub fn new(provider: Box<dyn ModelProvider>, max_retries: u32) -> Self {
        Self {
            provider,
            max_retries,
            backoff_unit: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Invoke the provider, updating API-call, retry, and token counters.
    /// Never returns an error: exhaustion records the terminal failure and
    /// yields the sentinel text instead.
    pub async fn invoke(
        &self,
        turns: &[ChatMessage],
        temperature: f32,
        metrics: &mut RunMetrics,
    ) -> String {
        let mut retry_count = 0u32;
        loop {
            metrics.api_calls += 1;
            match self.provider.send(turns, temperature).await {
                Ok(completion) => {
                    metrics
                        .tokens
                        .add(completion.prompt_tokens, completion.completion_tokens);
                    return completion.text;
                }
                Err(e) => {
                    retry_count += 1;
                    metrics.retries += 1;
                    if retry_count > self.max_retries {
                        metrics.record_error(AgentError::Model(e.to_string()).to_string());
                        warn!(
                            provider = self.provider.name(),
                            retries = self.max_retries,
                            error = %e,
                            "model invocation exhausted"
                        );
                        return MODEL_FAILURE_SENTINEL.to_string();
                    }
                    let wait = backoff_delay(self.backoff_unit, retry_count);
                    warn!(
                        provider = self.provider.name(),
                        retry = retry_count,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "model invocation failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Completion;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ScriptedProvider {
        /// Attempts that fail before the provider starts succeeding.
        failures_before_success: u64,
        attempts: Arc<AtomicU64>,
    }

    #[async_trait]
    impl crate::provider::ModelProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn send(&self, _turns: &[ChatMessage], _temperature: f32) -> Result<Completion> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_success {
                Err(anyhow!("transient provider error"))
            } else {
                Ok(Completion {
                    text: "ok".to_string(),
                    prompt_tokens: 11,
                    completion_tokens: 7,
                })
            }
        }
    }

    fn invoker(failures: u64, max_retries: u32) -> (ModelInvoker, Arc<AtomicU64>) {
        let attempts = Arc::new(AtomicU64::new(0));
        let provider = Box::new(ScriptedProvider {
            failures_before_success: failures,
            attempts: attempts.clone(),
        });
        (
            ModelInvoker::new(provider, max_retries)
                .with_backoff_unit(Duration::from_millis(1)),
            attempts,
        )
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let unit = Duration::from_secs(1);
        assert_eq!(backoff_delay(unit, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(unit, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(unit, 3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn exhaustion_returns_sentinel_and_records_error() {
        let (invoker, attempts) = invoker(u64::MAX, 3);
        let mut metrics = RunMetrics::new("t", "https://example.com", false);

        let text = invoker
            .invoke(&[ChatMessage::user("hi")], 0.2, &mut metrics)
            .await;

        assert_eq!(text, MODEL_FAILURE_SENTINEL);
        // Initial attempt plus three retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(metrics.api_calls, 4);
        assert_eq!(metrics.retries, 4);
        assert_eq!(metrics.errors.len(), 1);
        assert!(metrics.errors[0].starts_with("API error:"));
    }

    #[tokio::test]
    async fn recovery_after_transient_failures_counts_tokens() {
        let (invoker, _) = invoker(2, 3);
        let mut metrics = RunMetrics::new("t", "https://example.com", false);

        let text = invoker
            .invoke(&[ChatMessage::user("hi")], 0.2, &mut metrics)
            .await;

        assert_eq!(text, "ok");
        assert_eq!(metrics.api_calls, 3);
        assert_eq!(metrics.retries, 2);
        assert_eq!(metrics.tokens.prompt, 11);
        assert_eq!(metrics.tokens.completion, 7);
        assert_eq!(metrics.tokens.total, 18);
        assert!(metrics.errors.is_empty());
    }

    #[tokio::test]
    async fn success_on_first_attempt_needs_no_retries() {
        let (invoker, _) = invoker(0, 3);
        let mut metrics = RunMetrics::new("t", "https://example.com", false);
        let text = invoker
            .invoke(&[ChatMessage::user("hi")], 0.7, &mut metrics)
            .await;
        assert_eq!(text, "ok");
        assert_eq!(metrics.api_calls, 1);
        assert_eq!(metrics.retries, 0);
    }
}
