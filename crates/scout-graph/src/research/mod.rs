//! The default node set: a research assistant that classifies the request,
//! fans out web searches and writes a report, or answers/chats directly.

mod classify;
mod compose;
mod queries;
mod search;

use std::sync::Arc;
use std::time::Duration;

use scout_llm::Completer;

use crate::node::NodeRegistry;

pub use classify::{classify_by_keywords, ClassifyNode};
pub use compose::{build_sources, merge_node, AnswerNode, ChatNode, SynthesizeNode};
pub use queries::{parse_queries, GenerateQueriesNode};
pub use search::{legacy_content_key, ParallelSearchNode, SearchQueryRunner};

/// Node names of the research graph.
pub mod names {
    pub const CLASSIFY_INTENT_AND_TOPIC: &str = "classify_intent_and_topic";
    pub const GENERATE_SEARCH_QUERIES: &str = "generate_search_queries";
    /// Superseded by the engine's dynamic fan-out; kept routable.
    pub const EXECUTE_PARALLEL_SEARCH: &str = "execute_parallel_search";
    pub const MERGE_SEARCH_RESULTS: &str = "merge_search_results";
    pub const SYNTHESIZE_AND_REPORT: &str = "synthesize_and_report";
    pub const ANSWER_DIRECTLY: &str = "answer_directly";
    pub const HANDLE_CHAT: &str = "handle_chat";
}

pub fn default_nodes(
    completer: Completer,
    runner: Arc<SearchQueryRunner>,
    branch_timeout: Duration,
) -> NodeRegistry {
    NodeRegistry::builder()
        .register(ClassifyNode::new(completer.clone()))
        .register(GenerateQueriesNode::new(completer.clone()))
        .register(ParallelSearchNode::new(runner, branch_timeout))
        .register(merge_node())
        .register(SynthesizeNode::new(completer.clone()))
        .register(AnswerNode::new(completer.clone()))
        .register(ChatNode::new(completer))
        .build()
}
