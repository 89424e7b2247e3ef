//! Workflow engine: a node registry, edge decisions selected through a flow
//! table, and a driver loop with a dynamic search fan-out and an optional
//! ordered event stream.
//!
//! The default graph is a research assistant (see [`research`]): classify the
//! request, generate search queries, search them in parallel, and synthesize a
//! report, or answer/chat directly.

pub mod edge;
pub mod engine;
pub mod event;
pub mod fanout;
pub mod flow;
pub mod node;
pub mod research;
pub mod state;

pub use edge::{default_edges, EdgeFn, EdgeRegistry, FanoutKind, Transition};
pub use engine::{Engine, EngineSettings, ExecutionFailure, ExecutionResult};
pub use event::{EventEmitter, EventKind, GraphEvent};
pub use fanout::QueryRunner;
pub use flow::FlowTable;
pub use node::{FnNode, Node, NodeRegistry};
pub use state::{ExecutionState, Intent, StateSnapshot};
