use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scout_core::error::{Result, ScoutError};

use crate::event::EventKind;
use crate::state::ExecutionState;

/// Runs one search query for a fan-out branch and returns the text to store.
pub trait QueryRunner: Send + Sync + 'static {
    fn run<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        query: &'a str,
        branch: &'a str,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Synthetic node name of branch `index` (0-based) in `path`.
pub fn branch_label(index: usize) -> String {
    format!("search_query_{}", index + 1)
}

/// Key a branch's result is stored under in `contents`.
pub fn content_key(branch: &str) -> String {
    format!("Search_{branch}")
}

/// Run one branch per query concurrently and wait for all of them.
///
/// Branch labels are appended to `path` in query order before any branch
/// starts. Each branch has its own timeout and child token; a failing branch
/// is logged and skipped. Returns the number of successful branches, or
/// `AllBranchesFailed` when there are none.
///
/// Each branch's own events are ordered (`NodeStart` before `NodeComplete`
/// or `Error`), but events of sibling branches interleave in no particular
/// order, and their snapshots may include siblings' writes.
pub(crate) async fn run_search_fanout(
    runner: Arc<dyn QueryRunner>,
    state: Arc<ExecutionState>,
    cancel: &CancellationToken,
    branch_timeout: Duration,
    path: &mut Vec<String>,
) -> Result<usize> {
    let queries = state.queries();
    if queries.is_empty() {
        return Err(ScoutError::Precondition(
            "no search queries available for branching".into(),
        ));
    }

    let attempted = queries.len();
    info!(queries = attempted, "Starting search fan-out");
    let started = Instant::now();

    let mut handles = Vec::with_capacity(attempted);
    for (index, query) in queries.into_iter().enumerate() {
        let label = branch_label(index);
        path.push(label.clone());

        let runner = runner.clone();
        let state = state.clone();
        let token = cancel.child_token();
        handles.push(tokio::spawn(async move {
            run_branch(runner, state, token, query, label, branch_timeout).await
        }));
    }

    let mut succeeded = 0;
    for (index, joined) in join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(true) => succeeded += 1,
            Ok(false) => {}
            Err(e) => warn!(branch = %branch_label(index), error = %e, "Search branch task panicked"),
        }
    }

    if cancel.is_cancelled() {
        return Err(ScoutError::Cancelled);
    }

    info!(
        succeeded,
        attempted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Search fan-out completed"
    );

    if succeeded == 0 {
        return Err(ScoutError::AllBranchesFailed { attempted });
    }
    Ok(succeeded)
}

async fn run_branch(
    runner: Arc<dyn QueryRunner>,
    state: Arc<ExecutionState>,
    cancel: CancellationToken,
    query: String,
    label: String,
    timeout: Duration,
) -> bool {
    state.emit(EventKind::NodeStart, &label).await;

    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(ScoutError::Cancelled),
        result = tokio::time::timeout(timeout, runner.run(&cancel, &query, &label, &state)) => {
            result.unwrap_or_else(|_| {
                Err(ScoutError::BranchTimeout {
                    branch: label.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            })
        }
    };

    match outcome {
        Ok(content) => {
            state.set_content(content_key(&label), content);
            state.emit(EventKind::NodeComplete, &label).await;
            true
        }
        Err(e) => {
            warn!(branch = %label, query = %query, error = %e, "Search branch failed");
            state
                .emit(EventKind::Error { message: e.to_string() }, &label)
                .await;
            false
        }
    }
}
