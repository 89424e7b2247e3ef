use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use scout_core::config::{AppConfig, GraphConfig};
use scout_core::error::{Result, ScoutError};
use scout_core::traits::SearchClient;
use scout_llm::Completer;

use crate::edge::{default_edges, EdgeRegistry, FanoutKind, Transition};
use crate::event::{EventEmitter, EventKind, GraphEvent};
use crate::fanout::{self, QueryRunner};
use crate::flow::FlowTable;
use crate::node::NodeRegistry;
use crate::research::{self, SearchQueryRunner};
use crate::state::{ExecutionState, StateSnapshot};

/// Limits and fixed node names for a run.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_steps: usize,
    pub entry_node: String,
    /// Node the run continues with after a fan-out.
    pub post_fanout_node: String,
    pub branch_timeout: Duration,
    pub run_timeout: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&GraphConfig::default())
    }
}

impl From<&GraphConfig> for EngineSettings {
    fn from(config: &GraphConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            entry_node: config.entry_node.clone(),
            post_fanout_node: config.post_fanout_node.clone(),
            branch_timeout: config.branch_timeout(),
            run_timeout: config.run_timeout(),
        }
    }
}

/// Terminal report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    /// Final state.
    pub state: StateSnapshot,
    pub elapsed_ms: u64,
    /// Orchestration steps; a fan-out counts as one.
    pub steps: usize,
    /// Visited nodes in order, including one entry per fan-out branch.
    pub path: Vec<String>,
}

/// A failed run: the error plus everything observed up to the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub partial: Box<ExecutionResult>,
    pub error: ScoutError,
}

#[derive(Default)]
struct Progress {
    steps: usize,
    path: Vec<String>,
}

/// Walks the node graph from the entry node until a terminal transition.
pub struct Engine {
    nodes: NodeRegistry,
    edges: EdgeRegistry,
    flow: FlowTable,
    query_runner: Arc<dyn QueryRunner>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        nodes: NodeRegistry,
        edges: EdgeRegistry,
        flow: FlowTable,
        query_runner: Arc<dyn QueryRunner>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            nodes,
            edges,
            flow,
            query_runner,
            settings,
        }
    }

    /// The research graph over a completion service and optional real search.
    pub fn research(
        completer: Completer,
        search: Option<Arc<dyn SearchClient>>,
        graph: &GraphConfig,
    ) -> Result<Self> {
        let settings = EngineSettings::from(graph);
        let runner = Arc::new(SearchQueryRunner::new(completer.clone(), search.clone()));
        let nodes = research::default_nodes(completer, runner.clone(), settings.branch_timeout);
        let flow = FlowTable::default_flow().with_overrides(&graph.flow);

        let engine = Self::new(nodes, default_edges(), flow, runner, settings);
        engine.validate()?;
        Ok(engine)
    }

    /// Build the research graph with the clients described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = scout_llm::client_from_config(config);
        let completer = Completer::new(client, config.model.clone());
        let search = config
            .active_search()
            .and_then(scout_search::create_search_client);
        if search.is_none() {
            info!("No web search configured, branches will use simulated search");
        }
        Self::research(completer, search, &config.graph)
    }

    /// Check that the entry node and every routed edge exist.
    pub fn validate(&self) -> Result<()> {
        self.nodes.get(&self.settings.entry_node)?;
        self.nodes.get(&self.settings.post_fanout_node)?;
        for (node, edge) in self.flow.iter() {
            if !self.edges.contains(edge) {
                return Err(ScoutError::Config(format!(
                    "flow routes node {node} to unknown edge {edge}"
                )));
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn flow(&self) -> &FlowTable {
        &self.flow
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    /// Run silently and return the final result.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        input: &str,
    ) -> std::result::Result<ExecutionResult, ExecutionFailure> {
        self.run(cancel, input, Uuid::new_v4(), None).await
    }

    /// Run while sending progress events to `sink`.
    ///
    /// The engine holds the only sender for the duration of the run and drops
    /// it on return, so the receiver sees `None` right after the final
    /// `Complete` or `Error` event. Only that event has `terminal` set.
    pub async fn stream_execute(
        &self,
        cancel: &CancellationToken,
        input: &str,
        sink: mpsc::Sender<GraphEvent>,
    ) -> std::result::Result<ExecutionResult, ExecutionFailure> {
        let run_id = Uuid::new_v4();
        let emitter = EventEmitter::new(run_id, sink);
        self.run(cancel, input, run_id, Some(emitter)).await
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        input: &str,
        run_id: Uuid,
        emitter: Option<EventEmitter>,
    ) -> std::result::Result<ExecutionResult, ExecutionFailure> {
        let started = Instant::now();
        let state = Arc::new(ExecutionState::new(input));
        if let Some(emitter) = emitter {
            state.attach_emitter(emitter);
        }

        let run_cancel = cancel.child_token();
        let watchdog = self.settings.run_timeout.map(|limit| {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                token.cancel();
            })
        });

        info!(%run_id, max_steps = self.settings.max_steps, "Starting graph execution");
        state.emit(EventKind::Start, &self.settings.entry_node).await;

        let mut progress = Progress::default();
        let mut outcome = self.drive(&run_cancel, &state, &mut progress).await;

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        if matches!(outcome, Err(ScoutError::Cancelled)) && !cancel.is_cancelled() {
            if let Some(limit) = self.settings.run_timeout {
                outcome = Err(ScoutError::MaxDurationExceeded(limit.as_secs()));
            }
        }

        // Only this function touches the emitter from here on.
        let emitter = state.detach_emitter();
        let last_node = progress.path.last().cloned().unwrap_or_default();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                let result = ExecutionResult {
                    run_id,
                    state: state.snapshot(),
                    elapsed_ms,
                    steps: progress.steps,
                    path: progress.path,
                };
                info!(%run_id, steps = result.steps, elapsed_ms, "Graph execution completed");
                if let Some(emitter) = emitter {
                    emitter
                        .finish(EventKind::Complete, &last_node, result.state.clone())
                        .await;
                }
                Ok(result)
            }
            Err(error) => {
                state.set_error(error.to_string());
                let result = ExecutionResult {
                    run_id,
                    state: state.snapshot(),
                    elapsed_ms,
                    steps: progress.steps,
                    path: progress.path,
                };
                error!(%run_id, node = %last_node, steps = result.steps, error = %error, "Graph execution failed");
                if let Some(emitter) = emitter {
                    let kind = EventKind::Error {
                        message: error.to_string(),
                    };
                    emitter.finish(kind, &last_node, result.state.clone()).await;
                }
                Err(ExecutionFailure {
                    partial: Box::new(result),
                    error,
                })
            }
        }
    }

    async fn drive(
        &self,
        cancel: &CancellationToken,
        state: &Arc<ExecutionState>,
        progress: &mut Progress,
    ) -> Result<()> {
        let mut current = self.settings.entry_node.clone();

        loop {
            if progress.steps >= self.settings.max_steps {
                return Err(ScoutError::StepBudgetExceeded(self.settings.max_steps));
            }

            let node = self.nodes.get(&current)?;
            progress.path.push(current.clone());
            progress.steps += 1;
            state.set_current_node(current.as_str());
            debug!(node = %current, step = progress.steps, "Executing node");
            state.emit(EventKind::NodeStart, &current).await;

            let node_started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ScoutError::Cancelled),
                result = node.run(cancel, state) => result,
            };
            match result {
                Ok(()) => {}
                Err(ScoutError::Cancelled) => return Err(ScoutError::Cancelled),
                Err(e) => return Err(ScoutError::node_failed(current.as_str(), e)),
            }
            info!(
                node = %current,
                step = progress.steps,
                elapsed_ms = node_started.elapsed().as_millis() as u64,
                "Node completed"
            );
            state.emit(EventKind::NodeComplete, &current).await;

            let Some(edge) = self.flow.edge_for(&current) else {
                debug!(node = %current, "No outgoing edge, run complete");
                return Ok(());
            };
            let transition = self.edges.decide(edge, state).map_err(|e| {
                if e.is_structural() {
                    e
                } else {
                    ScoutError::edge_failed(current.as_str(), e)
                }
            })?;

            current = match transition {
                Transition::Terminal => return Ok(()),
                Transition::Goto(next) => next,
                Transition::Fanout(FanoutKind::SearchQueries) => {
                    fanout::run_search_fanout(
                        self.query_runner.clone(),
                        state.clone(),
                        cancel,
                        self.settings.branch_timeout,
                        &mut progress.path,
                    )
                    .await?;
                    self.settings.post_fanout_node.clone()
                }
            };
        }
    }
}
