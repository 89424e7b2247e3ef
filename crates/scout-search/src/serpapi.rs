use futures::future::BoxFuture;
use serde::Deserialize;

use scout_core::error::{Result, ScoutError};
use scout_core::traits::SearchClient;
use scout_core::types::SearchHit;

use crate::SEARCH_TIMEOUT;

const SERPAPI_URL: &str = "https://serpapi.com/search";
const PROVIDER: &str = "serpapi";

/// Google results through SerpAPI.
pub struct SerpApiClient {
    api_key: String,
    http: reqwest::Client,
}

impl SerpApiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct SerpApiResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Deserialize, Debug)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Decode a SerpAPI body. An `error` field is a failure even on HTTP 200.
fn parse_response(body: &str) -> Result<Vec<SearchHit>> {
    let response: SerpApiResponse =
        serde_json::from_str(body).map_err(|e| ScoutError::search(PROVIDER, e.to_string()))?;

    if let Some(error) = response.error {
        return Err(ScoutError::search(PROVIDER, error));
    }

    Ok(response
        .organic_results
        .into_iter()
        .map(|r| SearchHit {
            title: r.title,
            link: r.link,
            snippet: r.snippet,
        })
        .collect())
}

impl SearchClient for SerpApiClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
        Box::pin(async move {
            let resp = self
                .http
                .get(SERPAPI_URL)
                .query(&[
                    ("q", query),
                    ("engine", "google"),
                    ("api_key", self.api_key.as_str()),
                    ("num", "10"),
                    ("safe", "active"),
                ])
                .timeout(SEARCH_TIMEOUT)
                .send()
                .await
                .map_err(|e| ScoutError::search(PROVIDER, e.to_string()))?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| ScoutError::search(PROVIDER, e.to_string()))?;

            if !status.is_success() {
                return Err(ScoutError::search(PROVIDER, format!("HTTP {status}: {body}")));
            }

            parse_response(&body)
        })
    }
}
