use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use scout_core::error::{Result, ScoutError};
use scout_core::traits::SearchClient;
use scout_core::types::SearchHit;

use crate::SEARCH_TIMEOUT;

const TAVILY_URL: &str = "https://api.tavily.com/search";
const PROVIDER: &str = "tavily";

pub struct TavilyClient {
    api_key: String,
    max_results: u32,
    http: reqwest::Client,
}

impl TavilyClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            max_results: 10,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

fn parse_response(body: serde_json::Value) -> Result<Vec<SearchHit>> {
    let response: TavilyResponse =
        serde_json::from_value(body).map_err(|e| ScoutError::search(PROVIDER, e.to_string()))?;
    Ok(response
        .results
        .into_iter()
        .map(|r| SearchHit {
            title: r.title,
            link: r.url,
            snippet: r.content,
        })
        .collect())
}

impl SearchClient for TavilyClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(TAVILY_URL)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": self.max_results,
                }))
                .timeout(SEARCH_TIMEOUT)
                .send()
                .await
                .map_err(|e| ScoutError::search(PROVIDER, e.to_string()))?;

            if !resp.status().is_success() {
                return Err(ScoutError::search(
                    PROVIDER,
                    format!("HTTP {}", resp.status()),
                ));
            }

            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| ScoutError::search(PROVIDER, e.to_string()))?;

            parse_response(body)
        })
    }
}
