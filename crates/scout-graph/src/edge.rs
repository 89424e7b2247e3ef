use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use scout_core::error::{Result, ScoutError};

use crate::research::names;
use crate::state::{ExecutionState, Intent};

/// Kinds of dynamic fan-out the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutKind {
    /// One branch per generated search query.
    SearchQueries,
}

/// Where the run goes after an edge decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Goto(String),
    Fanout(FanoutKind),
    Terminal,
}

impl Transition {
    pub fn goto(node: impl Into<String>) -> Self {
        Self::Goto(node.into())
    }
}

/// Edge decision. Must only read the state.
pub type EdgeFn = Arc<dyn Fn(&ExecutionState) -> Result<Transition> + Send + Sync>;

/// Immutable name → edge decision table.
#[derive(Clone, Default)]
pub struct EdgeRegistry {
    edges: HashMap<String, EdgeFn>,
}

impl EdgeRegistry {
    pub fn builder() -> EdgeRegistryBuilder {
        EdgeRegistryBuilder::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Evaluate edge `name` against the state.
    pub fn decide(&self, name: &str, state: &ExecutionState) -> Result<Transition> {
        let edge = self
            .edges
            .get(name)
            .ok_or_else(|| ScoutError::EdgeNotFound(name.to_string()))?;
        let transition = edge(state)?;
        debug!(edge = name, ?transition, "Edge decision");
        Ok(transition)
    }
}

#[derive(Default)]
pub struct EdgeRegistryBuilder {
    edges: HashMap<String, EdgeFn>,
}

impl EdgeRegistryBuilder {
    pub fn register<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ExecutionState) -> Result<Transition> + Send + Sync + 'static,
    {
        self.edges.insert(name.into(), Arc::new(f));
        self
    }

    pub fn build(self) -> EdgeRegistry {
        EdgeRegistry { edges: self.edges }
    }
}

pub const AFTER_CLASSIFY: &str = "after_classify";
pub const AFTER_GENERATE_QUERIES: &str = "after_generate_queries";
pub const AFTER_SEARCH: &str = "after_search";
pub const AFTER_INDIVIDUAL_SEARCH: &str = "after_individual_search";
pub const AFTER_MERGE: &str = "after_merge";
pub const AFTER_REPORT: &str = "after_report";

/// Decision table for the research graph.
pub fn default_edges() -> EdgeRegistry {
    EdgeRegistry::builder()
        .register(AFTER_CLASSIFY, after_classify)
        .register(AFTER_GENERATE_QUERIES, after_generate_queries)
        .register(AFTER_SEARCH, after_search)
        .register(AFTER_INDIVIDUAL_SEARCH, |_: &ExecutionState| {
            Ok(Transition::goto(names::MERGE_SEARCH_RESULTS))
        })
        .register(AFTER_MERGE, after_merge)
        .register(AFTER_REPORT, |_: &ExecutionState| Ok(Transition::Terminal))
        .build()
}

fn after_classify(state: &ExecutionState) -> Result<Transition> {
    match state.intent() {
        Some(Intent::Research) => {
            if state.topic().trim().is_empty() {
                return Err(ScoutError::Precondition(
                    "research intent requires a topic".into(),
                ));
            }
            Ok(Transition::goto(names::GENERATE_SEARCH_QUERIES))
        }
        Some(Intent::Qa) => Ok(Transition::goto(names::ANSWER_DIRECTLY)),
        Some(Intent::Chat) | None => Ok(Transition::goto(names::HANDLE_CHAT)),
    }
}

fn after_generate_queries(state: &ExecutionState) -> Result<Transition> {
    if state.query_count() == 0 {
        return Err(ScoutError::Precondition("no search queries generated".into()));
    }
    Ok(Transition::Fanout(FanoutKind::SearchQueries))
}

fn after_search(state: &ExecutionState) -> Result<Transition> {
    if state.content_count() == 0 {
        return Err(ScoutError::Precondition("no search results collected".into()));
    }
    Ok(Transition::goto(names::SYNTHESIZE_AND_REPORT))
}

fn after_merge(state: &ExecutionState) -> Result<Transition> {
    if state.content_count() == 0 {
        return Err(ScoutError::Precondition(
            "no search results to synthesize".into(),
        ));
    }
    Ok(Transition::goto(names::SYNTHESIZE_AND_REPORT))
}
