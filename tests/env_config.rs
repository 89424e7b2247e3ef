use scout_core::config::AppConfig;

// Single test: the process environment is shared between test threads.
#[test]
fn test_config_from_environment() {
    for var in ["OPENAI_API_KEY", "OPENAI_MODEL", "OPENAI_BASE_URL", "SERPAPI_KEY"] {
        std::env::remove_var(var);
    }
    assert!(AppConfig::from_env().is_err(), "openai without a key is rejected");

    std::env::set_var("OPENAI_API_KEY", "sk-env");
    let config = AppConfig::from_env().expect("config from env");
    assert_eq!(config.model.api_key.as_deref(), Some("sk-env"));
    assert_eq!(config.model.model_id, "gpt-4o-2024-08-06");
    assert!(config.active_search().is_none());
    assert_eq!(config.graph.max_steps, 25);

    std::env::set_var("OPENAI_MODEL", "gpt-4o-mini");
    std::env::set_var("SERPAPI_KEY", "serp-env");
    let config = AppConfig::from_env().expect("config from env");
    assert_eq!(config.model.model_id, "gpt-4o-mini");
    let search = config.active_search().expect("search active");
    assert_eq!(search.provider, "serpapi");
    assert_eq!(search.api_key, "serp-env");

    for var in ["OPENAI_API_KEY", "OPENAI_MODEL", "SERPAPI_KEY"] {
        std::env::remove_var(var);
    }
}
