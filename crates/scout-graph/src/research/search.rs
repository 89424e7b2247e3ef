use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scout_core::error::{Result, ScoutError};
use scout_core::traits::SearchClient;
use scout_llm::Completer;

use super::names::EXECUTE_PARALLEL_SEARCH;
use crate::fanout::QueryRunner;
use crate::node::Node;
use crate::state::ExecutionState;

fn simulated_search_prompt(query: &str) -> String {
    format!(
        "Provide a concise, factual 2-3 paragraph summary answering the search query \"{query}\". \
         Focus on accurate and recent information; for technical topics include the latest developments."
    )
}

/// Answers one query with real web search, or with a model-written summary
/// when no search backend is configured.
pub struct SearchQueryRunner {
    completer: Completer,
    search: Option<Arc<dyn SearchClient>>,
}

impl SearchQueryRunner {
    pub fn new(completer: Completer, search: Option<Arc<dyn SearchClient>>) -> Self {
        Self { completer, search }
    }

    pub fn is_simulated(&self) -> bool {
        self.search.is_none()
    }
}

impl QueryRunner for SearchQueryRunner {
    fn run<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        query: &'a str,
        branch: &'a str,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            match &self.search {
                Some(search) => {
                    debug!(provider = search.name(), branch, query, "Running web search");
                    scout_search::search_and_summarize(search.as_ref(), query).await
                }
                None => {
                    debug!(branch, query, "Running simulated search");
                    self.completer
                        .generate_with(&simulated_search_prompt(query), |chunk| {
                            state.emit_chunk(branch, chunk)
                        })
                        .await
                }
            }
        })
    }
}

/// Content key used by [`ParallelSearchNode`]: index plus the first 20
/// characters of the query.
pub fn legacy_content_key(index: usize, query: &str) -> String {
    let prefix: String = query.chars().take(20).collect();
    format!("Search_{index}_{prefix}")
}

/// Runs every query concurrently inside a single node.
///
/// The default graph reaches searches through the engine's fan-out instead;
/// this node stays routable for flows that name it directly.
pub struct ParallelSearchNode {
    runner: Arc<SearchQueryRunner>,
    timeout: Duration,
}

impl ParallelSearchNode {
    pub fn new(runner: Arc<SearchQueryRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

impl Node for ParallelSearchNode {
    fn name(&self) -> &str {
        EXECUTE_PARALLEL_SEARCH
    }

    fn run<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let queries = state.queries();
            let searches = queries.iter().enumerate().map(|(index, query)| async move {
                let outcome = tokio::time::timeout(
                    self.timeout,
                    self.runner.run(cancel, query, EXECUTE_PARALLEL_SEARCH, state),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(ScoutError::BranchTimeout {
                        branch: legacy_content_key(index, query),
                        timeout_ms: self.timeout.as_millis() as u64,
                    })
                });
                (index, query, outcome)
            });

            for (index, query, outcome) in join_all(searches).await {
                match outcome {
                    Ok(content) => state.set_content(legacy_content_key(index, query), content),
                    Err(e) => warn!(index, query = %query, error = %e, "Search failed"),
                }
            }
            info!(results = state.content_count(), "Collected search results");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_test_utils::{hit, test_model_config, MockLlmClient, MockSearch};

    fn completer(mock: MockLlmClient) -> Completer {
        Completer::new(Arc::new(mock), test_model_config())
    }

    #[test]
    fn test_legacy_key_truncates_by_chars() {
        assert_eq!(legacy_content_key(0, "short"), "Search_0_short");
        assert_eq!(
            legacy_content_key(3, "ひらがなとカタカナと漢字が混ざったとても長いクエリ"),
            "Search_3_ひらがなとカタカナと漢字が混ざったとても"
        );
    }

    #[tokio::test]
    async fn test_runner_uses_real_search() {
        let llm = MockLlmClient::new();
        let search = MockSearch::new().with_hits("rust", vec![hit("Rust", "https://rust-lang.org", "Fast")]);
        let runner = SearchQueryRunner::new(completer(llm.clone()), Some(Arc::new(search)));
        assert!(!runner.is_simulated());

        let state = ExecutionState::new("x");
        let text = runner
            .run(&CancellationToken::new(), "rust language", "search_query_1", &state)
            .await
            .unwrap();
        assert!(text.starts_with("Search results for: rust language"));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_runner_falls_back_to_simulation() {
        let llm = MockLlmClient::new().with_reply("borrow checker", "The borrow checker enforces ownership.");
        let runner = SearchQueryRunner::new(completer(llm), None);
        assert!(runner.is_simulated());

        let state = ExecutionState::new("x");
        let text = runner
            .run(&CancellationToken::new(), "borrow checker", "search_query_2", &state)
            .await
            .unwrap();
        assert_eq!(text, "The borrow checker enforces ownership.");
    }

    #[tokio::test]
    async fn test_parallel_node_tolerates_failures() {
        let search = MockSearch::new()
            .with_hits("good", vec![hit("Good", "https://good", "ok")])
            .failing("bad", "HTTP 500")
            .delayed("slow", Duration::from_secs(5), vec![]);
        let runner = Arc::new(SearchQueryRunner::new(
            completer(MockLlmClient::new()),
            Some(Arc::new(search)),
        ));
        let node = ParallelSearchNode::new(runner, Duration::from_millis(50));

        let state = ExecutionState::new("x");
        for q in ["good query", "bad query", "slow query"] {
            state.append_query(q);
        }
        node.run(&CancellationToken::new(), &state).await.unwrap();

        let contents = state.contents();
        assert_eq!(contents.len(), 1);
        assert!(contents.contains_key("Search_0_good query"));
    }
}
