use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use scout_core::config::{ModelConfig, RetryConfig};
use scout_core::error::{Result, ScoutError};
use scout_core::traits::LlmClient;
use scout_core::types::*;

/// Retries transient failures on the primary model, then walks the fallback list.
///
/// Only opening the stream is retried. Once deltas are flowing, a mid-stream
/// error is surfaced to the caller as-is.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &ScoutError) -> bool {
    match e {
        ScoutError::LlmRequest(msg) => {
            let msg = msg.to_ascii_lowercase();
            ["429", "500", "502", "503", "504", "timeout", "timed out", "connection"]
                .iter()
                .any(|needle| msg.contains(needle))
        }
        ScoutError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((base as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.chat_stream(&config, messages.clone()).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                    }
                    Err(e) => {
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary model exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client.chat_stream(fb_config, messages.clone()).await {
                    Ok(stream) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(stream);
                    }
                    Err(e) => {
                        warn!(model = %fb_config.model_id, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| ScoutError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use scout_test_utils::MockLlmClient;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    async fn collect_text(client: &dyn LlmClient, config: &ModelConfig) -> Result<String> {
        let mut stream = client
            .chat_stream(config, vec![ChatMessage::user("hello")])
            .await?;
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            if let StreamDelta::TextDelta(t) = delta? {
                text.push_str(&t);
            }
        }
        Ok(text)
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&ScoutError::LlmRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_retryable(&ScoutError::LlmRequest("operation timed out".into())));
        assert!(is_retryable(&ScoutError::LlmStream("reset".into())));
        assert!(!is_retryable(&ScoutError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_retryable(&ScoutError::Cancelled));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d <= Duration::from_millis(4800));
        assert!(d >= Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let primary = MockLlmClient::new()
            .with_default_reply("recovered")
            .failing_first(2, "HTTP 503 unavailable");
        let probe = primary.clone();
        let client = RetryingClient::new(Box::new(primary), vec![], fast_retry(3));

        let text = collect_text(&client, &ModelConfig::default()).await.unwrap();
        assert_eq!(text, "recovered");
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_goes_straight_to_fallback() {
        let primary = MockLlmClient::new().failing_first(usize::MAX, "HTTP 401 unauthorized");
        let probe = primary.clone();
        let fallback = MockLlmClient::new().with_default_reply("from fallback");
        let fb_config = ModelConfig {
            model_id: "backup".into(),
            ..ModelConfig::default()
        };
        let client = RetryingClient::new(
            Box::new(primary),
            vec![(fb_config, Box::new(fallback))],
            fast_retry(3),
        );

        let text = collect_text(&client, &ModelConfig::default()).await.unwrap();
        assert_eq!(text, "from fallback");
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_fail_returns_primary_error() {
        let primary = MockLlmClient::new().failing_first(usize::MAX, "HTTP 500 boom");
        let client = RetryingClient::new(Box::new(primary), vec![], fast_retry(1));

        let err = collect_text(&client, &ModelConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500 boom"));
    }
}
