//! Provider chain with retries and failover

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::tools::ToolDefinition;

use super::types::{ChatMessage, ChatResponse, LlmProvider};

/// Routes LLM requests across providers, retrying transient failures with
/// exponential backoff before failing over to the next provider.
pub struct ModelRouter {
    /// Failover order, index 0 is the primary
    providers: Vec<Arc<dyn LlmProvider>>,
    max_retries_per_provider: u32,
    base_retry_delay: Duration,
}

impl ModelRouter {
    pub fn single(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            providers: vec![provider],
            max_retries_per_provider: 2,
            base_retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_failover(providers: Vec<Arc<dyn LlmProvider>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(anyhow!("ModelRouter requires at least one provider"));
        }
        Ok(Self {
            providers,
            max_retries_per_provider: 2,
            base_retry_delay: Duration::from_millis(500),
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries_per_provider = max_retries.max(1);
        self
    }

    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    async fn send_once(
        provider: &dyn LlmProvider,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        cap: Option<u32>,
    ) -> Result<ChatResponse> {
        match cap {
            Some(cap) => provider.chat_capped(messages, tools, system, cap).await,
            None => provider.chat(messages, tools, system).await,
        }
    }

    /// Delay before retry number `attempt` (0-based): base, 2x base, 4x base...
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_retry_delay * 2u32.saturating_pow(attempt)
    }

    async fn route(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        cap: Option<u32>,
    ) -> Result<ChatResponse> {
        let mut last_error = None;

        for (idx, provider) in self.providers.iter().enumerate() {
            let label = format!("{}/{}", provider.provider_name(), provider.model());
            if idx > 0 {
                info!("Failing over to {}", label);
            }

            let mut attempt = 0;
            loop {
                match Self::send_once(provider.as_ref(), messages, tools, system, cap).await {
                    Ok(response) => {
                        if idx > 0 {
                            info!("{} answered after failover", label);
                        }
                        return Ok(response);
                    }
                    Err(e) => {
                        let retryable = is_retryable_error(&e.to_string());
                        attempt += 1;
                        warn!(
                            "{} failed on attempt {}/{} (retryable={}): {}",
                            label, attempt, self.max_retries_per_provider, retryable, e
                        );
                        last_error = Some(e);
                        if !retryable || attempt >= self.max_retries_per_provider {
                            break;
                        }
                        let delay = self.backoff(attempt - 1);
                        debug!("Retrying {} in {:?}", label, delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No LLM provider configured")))
    }
}

#[async_trait]
impl LlmProvider for ModelRouter {
    fn provider_name(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.provider_name())
            .unwrap_or("unknown")
    }

    fn model(&self) -> &str {
        self.providers.first().map(|p| p.model()).unwrap_or("unknown")
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        self.route(messages, tools, system, None).await
    }

    async fn chat_capped(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        max_tokens: u32,
    ) -> Result<ChatResponse> {
        self.route(messages, tools, system, Some(max_tokens)).await
    }
}

/// Rate limits, server errors and network timeouts are worth another try
fn is_retryable_error(err: &str) -> bool {
    const RETRYABLE: &[&str] = &[
        "429",
        "500",
        "502",
        "503",
        "504",
        "rate limit",
        "rate_limit",
        "overloaded",
        "timeout",
        "timed out",
        "connection reset",
        "connection refused",
        "temporarily unavailable",
    ];
    let lower = err.to_lowercase();
    RETRYABLE.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scripted::{ScriptedProvider, Step};

    fn fast(router: ModelRouter) -> ModelRouter {
        router.with_base_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_transient_error_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::fail("status 503 Service Unavailable"),
            Step::text("recovered"),
        ]));
        let router = fast(ModelRouter::single(provider.clone()));
        let resp = router.chat(&[ChatMessage::user("hi")], &[], "").await.unwrap();
        assert_eq!(resp.text(), "recovered");
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_over() {
        let primary = Arc::new(ScriptedProvider::new(vec![Step::fail("status 401 bad key")]));
        let backup = Arc::new(ScriptedProvider::named("backup", vec![Step::text("from backup")]));
        let router = fast(ModelRouter::with_failover(vec![primary.clone(), backup]).unwrap());

        let resp = router.chat(&[ChatMessage::user("hi")], &[], "").await.unwrap();
        assert_eq!(resp.text(), "from backup");
        assert_eq!(primary.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_all_fail_returns_last_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::fail("timed out"),
            Step::fail("timed out again"),
        ]));
        let router = fast(ModelRouter::single(provider));
        let err = router.chat(&[], &[], "").await.unwrap_err();
        assert!(err.to_string().contains("again"));
    }

    #[test]
    fn test_empty_failover_rejected() {
        assert!(ModelRouter::with_failover(vec![]).is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let router = ModelRouter::single(Arc::new(ScriptedProvider::new(vec![])));
        assert_eq!(router.backoff(0), Duration::from_millis(500));
        assert_eq!(router.backoff(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_retryable_patterns() {
        assert!(is_retryable_error("HTTP 429 Too Many Requests"));
        assert!(is_retryable_error("Connection refused (os error 111)"));
        assert!(!is_retryable_error("invalid api key"));
    }
}
