use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use scout_core::error::{Result, ScoutError};

use crate::state::ExecutionState;

/// A named unit of work that reads and mutates the shared state.
///
/// Implementations must only write the state fields they own. The engine may
/// drop the returned future at any await point when the run is cancelled.
pub trait Node: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn run<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<()>>;
}

/// A node backed by a synchronous closure. Handy for validation steps.
pub struct FnNode<F> {
    name: String,
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(&ExecutionState) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Node for FnNode<F>
where
    F: Fn(&ExecutionState) -> Result<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { (self.f)(state) })
    }
}

/// Immutable name → node table.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn builder() -> NodeRegistryBuilder {
        NodeRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Node>> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ScoutError::NodeNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Default)]
pub struct NodeRegistryBuilder {
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl NodeRegistryBuilder {
    pub fn register(self, node: impl Node) -> Self {
        self.register_arc(Arc::new(node))
    }

    /// Register a shared node. A later registration under the same name wins.
    pub fn register_arc(mut self, node: Arc<dyn Node>) -> Self {
        let name = node.name().to_string();
        if self.nodes.insert(name.clone(), node).is_some() {
            warn!(node = %name, "Node registered twice, keeping the latest");
        }
        self
    }

    pub fn build(self) -> NodeRegistry {
        NodeRegistry { nodes: self.nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = NodeRegistry::builder()
            .register(FnNode::new("write_report", |state: &ExecutionState| {
                state.set_report("done");
                Ok(())
            }))
            .register(FnNode::new("noop", |_: &ExecutionState| Ok(())))
            .build();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["noop", "write_report"]);

        let state = ExecutionState::new("x");
        let node = registry.get("write_report").unwrap();
        node.run(&CancellationToken::new(), &state).await.unwrap();
        assert_eq!(state.report(), "done");
    }

    #[test]
    fn test_missing_node_is_structural() {
        let registry = NodeRegistry::builder().build();
        let err = registry.get("ghost").err().unwrap();
        assert!(err.is_structural());
        assert_eq!(err.to_string(), "node ghost not found");
    }

    #[test]
    fn test_duplicate_registration_keeps_latest() {
        let registry = NodeRegistry::builder()
            .register(FnNode::new("n", |_: &ExecutionState| Ok(())))
            .register(FnNode::new("n", |_: &ExecutionState| {
                Err(ScoutError::Precondition("second".into()))
            }))
            .build();
        assert_eq!(registry.len(), 1);
    }
}
