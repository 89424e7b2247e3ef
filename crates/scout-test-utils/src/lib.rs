//! Mocks and fixtures shared by the Scout test suites.
//!
//! Everything here is deterministic: replies are scripted by prompt
//! substring and streamed back word by word.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};

use scout_core::config::{AppConfig, GraphConfig, LogConfig, ModelConfig};
use scout_core::error::{Result, ScoutError};
use scout_core::traits::{LlmClient, SearchClient};
use scout_core::types::{ChatMessage, SearchHit, StopReason, StreamDelta};

/// Model config pointing nowhere; only meaningful to mocks.
pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        model_id: "mock-model".into(),
        api_key: Some("sk-test".into()),
        ..ModelConfig::default()
    }
}

/// A valid app config with fast timeouts for tests.
pub fn test_app_config() -> AppConfig {
    AppConfig {
        model: test_model_config(),
        fallback_models: vec![],
        web_search: None,
        graph: GraphConfig {
            branch_timeout_secs: 5,
            run_timeout_secs: 30,
            ..GraphConfig::default()
        },
        log: LogConfig::default(),
    }
}

pub fn hit(title: &str, link: &str, snippet: &str) -> SearchHit {
    SearchHit {
        title: title.into(),
        link: link.into(),
        snippet: snippet.into(),
    }
}

/// Scripted [`LlmClient`].
///
/// Clones share call counters and the prompt log, so a test can keep a
/// probe after handing the client to the code under test.
#[derive(Clone, Default)]
pub struct MockLlmClient {
    replies: Vec<(String, String)>,
    default_reply: Option<String>,
    fail_first: usize,
    fail_message: String,
    chunk_delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` whenever the prompt contains `needle`.
    /// Earlier registrations win.
    pub fn with_reply(mut self, needle: &str, reply: &str) -> Self {
        self.replies.push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn with_default_reply(mut self, reply: &str) -> Self {
        self.default_reply = Some(reply.to_string());
        self
    }

    /// Fail the first `n` calls with `LlmRequest(message)`.
    pub fn failing_first(mut self, n: usize, message: &str) -> Self {
        self.fail_first = n;
        self.fail_message = message.to_string();
        self
    }

    /// Sleep before every streamed chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reply_for(&self, prompt: &str) -> Option<String> {
        self.replies
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .or_else(|| self.default_reply.clone())
    }
}

impl LlmClient for MockLlmClient {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(prompt.clone());

            if call < self.fail_first {
                return Err(ScoutError::LlmRequest(self.fail_message.clone()));
            }

            let reply = self.reply_for(&prompt).ok_or_else(|| {
                ScoutError::LlmRequest(format!("no scripted reply for prompt: {prompt}"))
            })?;

            let mut deltas: Vec<Result<StreamDelta>> = reply
                .split_inclusive(' ')
                .map(|word| Ok(StreamDelta::TextDelta(word.to_string())))
                .collect();
            deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));

            let delay = self.chunk_delay;
            let stream = stream::iter(deltas).then(move |delta| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                delta
            });
            Ok(Box::pin(stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[derive(Clone)]
enum SearchBehavior {
    Hits(Vec<SearchHit>),
    Fail(String),
    Delay(Duration, Vec<SearchHit>),
}

/// Scripted [`SearchClient`]; unmatched queries return no hits.
#[derive(Clone, Default)]
pub struct MockSearch {
    rules: Vec<(String, SearchBehavior)>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, needle: &str, hits: Vec<SearchHit>) -> Self {
        self.rules
            .push((needle.to_string(), SearchBehavior::Hits(hits)));
        self
    }

    pub fn failing(mut self, needle: &str, message: &str) -> Self {
        self.rules
            .push((needle.to_string(), SearchBehavior::Fail(message.to_string())));
        self
    }

    pub fn delayed(mut self, needle: &str, delay: Duration, hits: Vec<SearchHit>) -> Self {
        self.rules
            .push((needle.to_string(), SearchBehavior::Delay(delay, hits)));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SearchClient for MockSearch {
    fn name(&self) -> &str {
        "mock"
    }

    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
        Box::pin(async move {
            self.queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(query.to_string());

            let behavior = self
                .rules
                .iter()
                .find(|(needle, _)| query.contains(needle.as_str()))
                .map(|(_, b)| b.clone());

            match behavior {
                None => Ok(vec![]),
                Some(SearchBehavior::Hits(hits)) => Ok(hits),
                Some(SearchBehavior::Fail(message)) => Err(ScoutError::search("mock", message)),
                Some(SearchBehavior::Delay(delay, hits)) => {
                    tokio::time::sleep(delay).await;
                    Ok(hits)
                }
            }
        })
    }
}
