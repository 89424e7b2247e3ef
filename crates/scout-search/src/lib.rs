pub mod serpapi;
pub mod tavily;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use scout_core::config::WebSearchConfig;
use scout_core::error::Result;
use scout_core::traits::SearchClient;
use scout_core::types::SearchHit;

pub use serpapi::SerpApiClient;
pub use tavily::TavilyClient;

/// Per-request HTTP timeout for search backends.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Hits included in a summary.
pub const SUMMARY_HITS: usize = 5;

/// Build the configured search backend, or `None` when real search is off.
pub fn create_search_client(config: &WebSearchConfig) -> Option<Arc<dyn SearchClient>> {
    if !config.is_active() {
        return None;
    }
    match config.provider.as_str() {
        "serpapi" => Some(Arc::new(SerpApiClient::new(&config.api_key))),
        "tavily" => Some(Arc::new(TavilyClient::new(&config.api_key))),
        other => {
            warn!(provider = other, "Unknown search provider, using simulated search");
            None
        }
    }
}

/// Search and render the top hits as a markdown-ish text block.
pub async fn search_and_summarize(client: &dyn SearchClient, query: &str) -> Result<String> {
    let hits = client.search(query).await?;
    debug!(provider = client.name(), query, hits = hits.len(), "Search completed");
    Ok(summarize_hits(query, &hits))
}

pub fn summarize_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No search results found for: {query}");
    }

    let mut out = format!("Search results for: {query}\n\n");
    for (i, hit) in hits.iter().take(SUMMARY_HITS).enumerate() {
        let _ = write!(
            out,
            "{}. **{}**\n   {}\n   Source: {}\n\n",
            i + 1,
            hit.title,
            hit.snippet,
            hit.link
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_test_utils::hit;

    #[test]
    fn test_summarize_empty() {
        assert_eq!(
            summarize_hits("nothing here", &[]),
            "No search results found for: nothing here"
        );
    }

    #[test]
    fn test_summarize_caps_at_five() {
        let hits: Vec<_> = (1..=7)
            .map(|i| hit(&format!("T{i}"), &format!("https://x/{i}"), &format!("s{i}")))
            .collect();
        let summary = summarize_hits("q", &hits);
        assert!(summary.starts_with("Search results for: q\n\n1. **T1**\n   s1\n   Source: https://x/1\n\n"));
        assert!(summary.contains("5. **T5**"));
        assert!(!summary.contains("T6"));
    }

    #[test]
    fn test_create_client_respects_activity() {
        let mut config = WebSearchConfig {
            provider: "serpapi".into(),
            api_key: "".into(),
            enabled: true,
        };
        assert!(create_search_client(&config).is_none());

        config.api_key = "key".into();
        assert_eq!(create_search_client(&config).unwrap().name(), "serpapi");

        config.provider = "tavily".into();
        assert_eq!(create_search_client(&config).unwrap().name(), "tavily");

        config.provider = "bing".into();
        assert!(create_search_client(&config).is_none());
    }
}
