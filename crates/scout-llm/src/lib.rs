pub mod completion;
pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use scout_core::config::{AppConfig, ModelConfig, RetryConfig};
use scout_core::traits::LlmClient;

pub use completion::Completer;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
///
/// Every provider is spoken to through the OpenAI-compatible wire format;
/// the provider name only selects the default endpoint.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    Box::new(OpenAiClient::for_provider(&config.provider))
}

/// Build the client stack for an app config: primary model, wrapped in a
/// retry/fallback layer when retries or fallback models are configured.
pub fn client_from_config(config: &AppConfig) -> Arc<dyn LlmClient> {
    let primary = create_client(&config.model);
    if config.fallback_models.is_empty() && config.model.retry.is_none() {
        return Arc::from(primary);
    }

    let retry_config = config
        .model
        .retry
        .clone()
        .unwrap_or_else(RetryConfig::default);
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|mc| (mc.clone(), create_client(mc)))
        .collect();
    Arc::new(RetryingClient::new(primary, fallbacks, retry_config))
}
