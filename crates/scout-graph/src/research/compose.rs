use std::collections::BTreeMap;
use std::fmt::Write as _;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::info;

use scout_core::error::{Result, ScoutError};
use scout_llm::Completer;

use super::names::{ANSWER_DIRECTLY, HANDLE_CHAT, MERGE_SEARCH_RESULTS, SYNTHESIZE_AND_REPORT};
use crate::node::{FnNode, Node};
use crate::state::ExecutionState;

/// Fan-out branches already wrote their results; merging only checks there are some.
pub fn merge_node() -> impl Node {
    FnNode::new(MERGE_SEARCH_RESULTS, |state: &ExecutionState| {
        let merged = state.content_count();
        if merged == 0 {
            return Err(ScoutError::Precondition("no search results to merge".into()));
        }
        info!(results = merged, "Merged search results");
        Ok(())
    })
}

/// Render collected contents as `=== source ===` sections.
pub fn build_sources(contents: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (source, content) in contents {
        let _ = write!(out, "=== {source} ===\n{content}\n\n");
    }
    out
}

fn report_prompt(topic: &str, sources: &str) -> String {
    format!(
        r#"Write a research report about "{topic}" based on the search results below.

Search results:
{sources}
Use this markdown structure:

# Research report: {topic}

## Summary
A short paragraph with the key takeaways.

## Key findings
A numbered list of the most important facts, each with a bold lead-in.

## Detailed analysis
A few paragraphs connecting the findings.

## Related concepts
A bulleted glossary of the technologies and terms involved.

## Recommendations and next steps
Concrete suggestions for someone looking into "{topic}"."#
    )
}

/// Stream `prompt` as `node`'s output and store the full text as the report.
async fn stream_report(
    completer: &Completer,
    node: &'static str,
    prompt: &str,
    state: &ExecutionState,
) -> Result<()> {
    let report = completer
        .generate_with(prompt, |chunk| state.emit_chunk(node, chunk))
        .await?;
    info!(node, chars = report.chars().count(), "Report generated");
    state.set_report(report);
    Ok(())
}

pub struct SynthesizeNode {
    completer: Completer,
}

impl SynthesizeNode {
    pub fn new(completer: Completer) -> Self {
        Self { completer }
    }
}

impl Node for SynthesizeNode {
    fn name(&self) -> &str {
        SYNTHESIZE_AND_REPORT
    }

    fn run<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let prompt = report_prompt(&state.topic(), &build_sources(&state.contents()));
            stream_report(&self.completer, SYNTHESIZE_AND_REPORT, &prompt, state).await
        })
    }
}

pub struct AnswerNode {
    completer: Completer,
}

impl AnswerNode {
    pub fn new(completer: Completer) -> Self {
        Self { completer }
    }
}

impl Node for AnswerNode {
    fn name(&self) -> &str {
        ANSWER_DIRECTLY
    }

    fn run<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let prompt = format!(
                "Answer the following question concisely: {}",
                state.input()
            );
            stream_report(&self.completer, ANSWER_DIRECTLY, &prompt, state).await
        })
    }
}

pub struct ChatNode {
    completer: Completer,
}

impl ChatNode {
    pub fn new(completer: Completer) -> Self {
        Self { completer }
    }
}

impl Node for ChatNode {
    fn name(&self) -> &str {
        HANDLE_CHAT
    }

    fn run<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let prompt = format!(
                "Reply to the following message in a friendly, helpful way: {}",
                state.input()
            );
            stream_report(&self.completer, HANDLE_CHAT, &prompt, state).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use scout_test_utils::{test_model_config, MockLlmClient};

    #[test]
    fn test_build_sources_is_ordered() {
        let mut contents = BTreeMap::new();
        contents.insert("Search_search_query_2".to_string(), "beta".to_string());
        contents.insert("Search_search_query_1".to_string(), "alpha".to_string());
        assert_eq!(
            build_sources(&contents),
            "=== Search_search_query_1 ===\nalpha\n\n=== Search_search_query_2 ===\nbeta\n\n"
        );
    }

    #[tokio::test]
    async fn test_merge_requires_contents() {
        let node = merge_node();
        let state = ExecutionState::new("x");
        assert!(node.run(&CancellationToken::new(), &state).await.is_err());

        state.set_content("Search_search_query_1", "text");
        assert!(node.run(&CancellationToken::new(), &state).await.is_ok());
    }

    #[tokio::test]
    async fn test_synthesize_includes_sources() {
        let mock = MockLlmClient::new().with_default_reply("# Research report");
        let probe = mock.clone();
        let node = SynthesizeNode::new(Completer::new(Arc::new(mock), test_model_config()));

        let state = ExecutionState::new("tell me about tokio");
        state.set_topic("tokio");
        state.set_content("Search_search_query_1", "Tokio is an async runtime.");
        node.run(&CancellationToken::new(), &state).await.unwrap();

        assert_eq!(state.report(), "# Research report");
        let prompt = &probe.prompts()[0];
        assert!(prompt.contains("=== Search_search_query_1 ===\nTokio is an async runtime."));
        assert!(prompt.contains("\"tokio\""));
    }

    #[tokio::test]
    async fn test_chat_and_answer_write_report() {
        let mock = MockLlmClient::new()
            .with_reply("friendly", "Hello! How can I help?")
            .with_reply("concisely", "2");
        let completer = Completer::new(Arc::new(mock), test_model_config());

        let state = ExecutionState::new("hello");
        ChatNode::new(completer.clone())
            .run(&CancellationToken::new(), &state)
            .await
            .unwrap();
        assert_eq!(state.report(), "Hello! How can I help?");

        let state = ExecutionState::new("1+1");
        AnswerNode::new(completer)
            .run(&CancellationToken::new(), &state)
            .await
            .unwrap();
        assert_eq!(state.report(), "2");
    }
}
