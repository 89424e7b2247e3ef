use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use scout_core::error::Result;
use scout_llm::Completer;

use super::names::GENERATE_SEARCH_QUERIES;
use crate::node::Node;
use crate::state::ExecutionState;

/// Queries of this many characters or fewer are discarded as noise.
const MIN_QUERY_CHARS: usize = 5;

fn queries_prompt(topic: &str) -> String {
    format!(
        r#"Generate 4-5 diverse web search queries to research the following topic thoroughly: "{topic}"

Cover these angles:
1. Basic introduction and overview
2. Latest developments and news
3. Practical use cases and applications
4. Technical details or implementation
5. Challenges and limitations

Return the queries as a JSON array of strings:
["query 1", "query 2", "query 3", "query 4", "query 5"]"#
    )
}

fn array_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[\s\S]*?\]").ok()).as_ref()
}

fn is_meaningful(query: &str) -> bool {
    query.chars().count() > MIN_QUERY_CHARS
}

/// First JSON array of strings in the text that yields at least one usable query.
fn parse_json_queries(text: &str) -> Vec<String> {
    let Some(re) = array_regex() else {
        return Vec::new();
    };
    let cleaned = text.replace("```json", "").replace("```", "");
    for candidate in re.find_iter(&cleaned) {
        let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(candidate.as_str()) else {
            continue;
        };
        let queries: Vec<String> = values
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|q| is_meaningful(q))
            .map(String::from)
            .collect();
        if !queries.is_empty() {
            return queries;
        }
    }
    Vec::new()
}

/// Fallback: the text between the first and last double quote of each line.
fn extract_quoted_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let start = line.find('"')?;
            let end = line.rfind('"')?;
            (end > start).then(|| line[start + 1..end].trim())
        })
        .filter(|q| is_meaningful(q))
        .map(String::from)
        .collect()
}

/// Pull search queries out of a model response.
pub fn parse_queries(text: &str) -> Vec<String> {
    let queries = parse_json_queries(text);
    if !queries.is_empty() {
        return queries;
    }
    debug!("No JSON array in query response, extracting quoted lines");
    extract_quoted_lines(text)
}

/// Streams a query-generation prompt and appends the parsed queries.
pub struct GenerateQueriesNode {
    completer: Completer,
}

impl GenerateQueriesNode {
    pub fn new(completer: Completer) -> Self {
        Self { completer }
    }
}

impl Node for GenerateQueriesNode {
    fn name(&self) -> &str {
        GENERATE_SEARCH_QUERIES
    }

    fn run<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let prompt = queries_prompt(&state.topic());
            let response = self
                .completer
                .generate_with(&prompt, |chunk| state.emit_chunk(GENERATE_SEARCH_QUERIES, chunk))
                .await?;

            for query in parse_queries(&response) {
                state.append_query(query);
            }
            info!(queries = state.query_count(), "Generated search queries");
            Ok(())
        })
    }
}
