use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use scout_core::config::ModelConfig;
use scout_core::error::Result;
use scout_core::traits::LlmClient;
use scout_core::types::{ChatMessage, StreamDelta};

/// Single-prompt completion on top of a streaming [`LlmClient`].
///
/// Graph nodes only ever send one user prompt and want the full text back,
/// optionally observing chunks as they arrive.
#[derive(Clone)]
pub struct Completer {
    client: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl Completer {
    pub fn new(client: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { client, config }
    }

    pub fn model(&self) -> &ModelConfig {
        &self.config
    }

    /// Run the prompt and return the full response text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with(prompt, |_| async {}).await
    }

    /// Run the prompt, awaiting `on_chunk` for each text delta before reading the next.
    pub async fn generate_with<F, Fut>(&self, prompt: &str, mut on_chunk: F) -> Result<String>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ()>,
    {
        let messages = vec![ChatMessage::user(prompt)];
        let mut stream = self.client.chat_stream(&self.config, messages).await?;

        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::TextDelta(chunk) => {
                    text.push_str(&chunk);
                    on_chunk(chunk).await;
                }
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    debug!(input_tokens, output_tokens, model = %self.config.model_id, "Completion usage");
                }
                StreamDelta::Stop(reason) => {
                    debug!(?reason, "Completion stopped");
                }
            }
        }

        Ok(text)
    }
}
