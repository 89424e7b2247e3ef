use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ScoutError};

/// Top-level Scout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_model_id() -> String { "gpt-4o-2024-08-06".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_enabled")]
    pub enabled: bool,
}

impl WebSearchConfig {
    /// Real search is used only when enabled and a key is present;
    /// otherwise the graph falls back to simulated search.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}

fn default_search_provider() -> String { "serpapi".to_string() }
fn default_search_enabled() -> bool { true }

/// Orchestration limits and topology overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum orchestration steps before the run is aborted.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_entry_node")]
    pub entry_node: String,
    /// Node that runs after a dynamic fan-out completes.
    #[serde(default = "default_post_fanout_node")]
    pub post_fanout_node: String,
    /// Per-branch timeout for fan-out sub-tasks.
    #[serde(default = "default_branch_timeout")]
    pub branch_timeout_secs: u64,
    /// Whole-run deadline (0 = none).
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    /// Capacity of the streaming event channel created by the CLI.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Node → edge overrides merged over the default flow table.
    #[serde(default)]
    pub flow: BTreeMap<String, String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            entry_node: default_entry_node(),
            post_fanout_node: default_post_fanout_node(),
            branch_timeout_secs: default_branch_timeout(),
            run_timeout_secs: default_run_timeout(),
            event_buffer: default_event_buffer(),
            flow: BTreeMap::new(),
        }
    }
}

impl GraphConfig {
    pub fn branch_timeout(&self) -> Duration {
        Duration::from_secs(self.branch_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }
}

fn default_max_steps() -> usize { 25 }
fn default_entry_node() -> String { "classify_intent_and_topic".to_string() }
fn default_post_fanout_node() -> String { "merge_search_results".to_string() }
fn default_branch_timeout() -> u64 { 30 }
fn default_run_timeout() -> u64 { 300 }
fn default_event_buffer() -> usize { 32 }

/// Logging configuration. `RUST_LOG` takes precedence when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String { "scout=info,warn".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ScoutError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| ScoutError::Config(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), model = %config.model.model_id, "Loaded config");
        Ok(config)
    }

    /// Build a config purely from the environment.
    ///
    /// Reads `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL` and `SERPAPI_KEY`.
    pub fn from_env() -> Result<Self> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut model = ModelConfig {
            api_key: env("OPENAI_API_KEY"),
            base_url: env("OPENAI_BASE_URL"),
            ..ModelConfig::default()
        };
        if let Some(model_id) = env("OPENAI_MODEL") {
            model.model_id = model_id;
        }

        let web_search = env("SERPAPI_KEY").map(|api_key| WebSearchConfig {
            provider: default_search_provider(),
            api_key,
            enabled: true,
        });

        if web_search.is_none() {
            debug!("SERPAPI_KEY not set, web search disabled");
        }

        let config = Self {
            model,
            fallback_models: vec![],
            web_search,
            graph: GraphConfig::default(),
            log: LogConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.model.provider == "openai" && self.model.base_url.is_none() {
            match self.model.api_key.as_deref().map(str::trim) {
                None | Some("") | Some("your-api-key-here") => {
                    return Err(ScoutError::Config(
                        "model.api_key is required for the openai provider (set OPENAI_API_KEY)"
                            .into(),
                    ));
                }
                Some(_) => {}
            }
        }
        if self.graph.max_steps == 0 {
            return Err(ScoutError::Config("graph.max_steps must be positive".into()));
        }
        if self.graph.branch_timeout_secs == 0 {
            return Err(ScoutError::Config(
                "graph.branch_timeout_secs must be positive".into(),
            ));
        }
        if self.graph.event_buffer == 0 {
            return Err(ScoutError::Config("graph.event_buffer must be positive".into()));
        }
        if self.graph.entry_node.trim().is_empty() {
            return Err(ScoutError::Config("graph.entry_node cannot be empty".into()));
        }
        Ok(())
    }

    /// Active web search settings, if real search should be used.
    pub fn active_search(&self) -> Option<&WebSearchConfig> {
        self.web_search.as_ref().filter(|ws| ws.is_active())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => {
                    warn!(var = %var_name, "Config references an unset environment variable");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
