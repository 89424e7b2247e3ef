use std::collections::BTreeMap;

use crate::edge::{AFTER_CLASSIFY, AFTER_GENERATE_QUERIES, AFTER_MERGE, AFTER_REPORT, AFTER_SEARCH};
use crate::research::names;

/// Node name → name of the edge evaluated after it.
///
/// A node with no entry is terminal: the run ends after it without
/// consulting any edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowTable {
    routes: BTreeMap<String, String>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, node: impl Into<String>, edge: impl Into<String>) -> Self {
        self.routes.insert(node.into(), edge.into());
        self
    }

    pub fn edge_for(&self, node: &str) -> Option<&str> {
        self.routes.get(node).map(String::as_str)
    }

    /// Apply overrides on top of this table. An empty edge name removes the
    /// route, making that node terminal.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (node, edge) in overrides {
            if edge.trim().is_empty() {
                self.routes.remove(node);
            } else {
                self.routes.insert(node.clone(), edge.clone());
            }
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(n, e)| (n.as_str(), e.as_str()))
    }

    /// Topology of the research graph.
    pub fn default_flow() -> Self {
        Self::new()
            .route(names::CLASSIFY_INTENT_AND_TOPIC, AFTER_CLASSIFY)
            .route(names::GENERATE_SEARCH_QUERIES, AFTER_GENERATE_QUERIES)
            .route(names::EXECUTE_PARALLEL_SEARCH, AFTER_SEARCH)
            .route(names::MERGE_SEARCH_RESULTS, AFTER_MERGE)
            .route(names::SYNTHESIZE_AND_REPORT, AFTER_REPORT)
            .route(names::ANSWER_DIRECTLY, AFTER_REPORT)
            .route(names::HANDLE_CHAT, AFTER_REPORT)
    }
}
