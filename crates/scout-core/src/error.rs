use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoutError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Search errors
    #[error("Search failed: {provider}: {message}")]
    SearchRequest { provider: String, message: String },

    // Graph structure errors
    #[error("node {0} not found")]
    NodeNotFound(String),

    #[error("edge {0} not found")]
    EdgeNotFound(String),

    // Graph execution errors
    #[error("{0}")]
    Precondition(String),

    #[error("node {node} failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: Box<ScoutError>,
    },

    #[error("edge decision failed after {node}: {source}")]
    EdgeFailed {
        node: String,
        #[source]
        source: Box<ScoutError>,
    },

    #[error("branch {branch} timed out after {timeout_ms}ms")]
    BranchTimeout { branch: String, timeout_ms: u64 },

    #[error("all search branches failed ({attempted} attempted)")]
    AllBranchesFailed { attempted: usize },

    #[error("execution exceeded maximum steps ({0})")]
    StepBudgetExceeded(usize),

    #[error("execution exceeded max duration ({0}s)")]
    MaxDurationExceeded(u64),

    #[error("execution cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScoutError {
    /// Wrap a node's own error with the node name.
    pub fn node_failed(node: impl Into<String>, source: ScoutError) -> Self {
        Self::NodeFailed {
            node: node.into(),
            source: Box::new(source),
        }
    }

    /// Wrap an edge decision error with the node it followed.
    pub fn edge_failed(node: impl Into<String>, source: ScoutError) -> Self {
        Self::EdgeFailed {
            node: node.into(),
            source: Box::new(source),
        }
    }

    pub fn search(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SearchRequest {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Structural errors mean the graph itself is misconfigured.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::NodeNotFound(_) | Self::EdgeNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_messages() {
        let err = ScoutError::node_failed("handle_chat", ScoutError::LlmRequest("HTTP 500".into()));
        assert_eq!(
            err.to_string(),
            "node handle_chat failed: LLM request failed: HTTP 500"
        );

        let err = ScoutError::edge_failed(
            "classify_intent_and_topic",
            ScoutError::Precondition("research intent requires a topic".into()),
        );
        assert_eq!(
            err.to_string(),
            "edge decision failed after classify_intent_and_topic: research intent requires a topic"
        );
    }

    #[test]
    fn test_structural() {
        assert!(ScoutError::NodeNotFound("x".into()).is_structural());
        assert!(ScoutError::EdgeNotFound("y".into()).is_structural());
        assert!(!ScoutError::Cancelled.is_structural());
    }
}
