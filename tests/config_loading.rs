use std::io::Write;

use scout_core::config::AppConfig;
use scout_graph::Engine;

fn write_config(toml_content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");
    tmp
}

#[test]
fn test_load_full_config_from_file() {
    let tmp = write_config(
        r#"
[model]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-test-key"
max_tokens = 2048
temperature = 0.2

[model.retry]
max_retries = 5

[[fallback_models]]
provider = "ollama"
model_id = "llama3.2"
base_url = "http://localhost:11434/v1/chat/completions"

[web_search]
provider = "tavily"
api_key = "tv-key"

[graph]
max_steps = 12
branch_timeout_secs = 10
run_timeout_secs = 0
event_buffer = 64

[graph.flow]
synthesize_and_report = ""

[log]
filter = "scout=debug"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.model_id, "gpt-4o-mini");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 2048);
    assert_eq!(config.model.retry.as_ref().map(|r| r.max_retries), Some(5));
    assert_eq!(config.fallback_models.len(), 1);
    assert_eq!(config.fallback_models[0].provider, "ollama");

    let search = config.active_search().expect("search active");
    assert_eq!(search.provider, "tavily");

    assert_eq!(config.graph.max_steps, 12);
    assert_eq!(config.graph.run_timeout(), None);
    assert_eq!(config.graph.event_buffer, 64);
    assert_eq!(config.graph.flow.get("synthesize_and_report").map(String::as_str), Some(""));
    assert_eq!(config.log.filter, "scout=debug");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SCOUT_TEST_API_KEY", "expanded-key-value");

    let tmp = write_config(
        r#"
[model]
model_id = "test-model"
api_key = "${SCOUT_TEST_API_KEY}"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("SCOUT_TEST_API_KEY");
}

#[test]
fn test_missing_file_and_invalid_values() {
    assert!(AppConfig::load(std::path::Path::new("/nonexistent/scout.toml")).is_err());

    let tmp = write_config(
        r#"
[model]
api_key = "sk-test"

[graph]
branch_timeout_secs = 0
"#,
    );
    assert!(AppConfig::load(tmp.path()).is_err());
}

#[test]
fn test_engine_from_loaded_config() {
    let tmp = write_config(
        r#"
[model]
api_key = "sk-test"

[graph]
max_steps = 8

[graph.flow]
synthesize_and_report = ""
"#,
    );
    let config = AppConfig::load(tmp.path()).expect("load config");

    let engine = Engine::from_config(&config).expect("build engine");
    assert_eq!(engine.settings().max_steps, 8);
    assert_eq!(engine.nodes().len(), 7);
    assert!(engine.flow().edge_for("synthesize_and_report").is_none());
    assert!(engine.flow().edge_for("classify_intent_and_topic").is_some());
}

#[test]
fn test_engine_rejects_unknown_edge_override() {
    let tmp = write_config(
        r#"
[model]
api_key = "sk-test"

[graph.flow]
handle_chat = "after_nothing"
"#,
    );
    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(Engine::from_config(&config).is_err());
}

#[test]
fn test_engine_rejects_unknown_entry_node() {
    let tmp = write_config(
        r#"
[model]
api_key = "sk-test"

[graph]
entry_node = "does_not_exist"
"#,
    );
    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(Engine::from_config(&config).is_err());
}
