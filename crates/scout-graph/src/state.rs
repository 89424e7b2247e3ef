use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::event::{EventEmitter, EventKind};

/// What the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Research,
    Qa,
    Chat,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Qa => "qa",
            Self::Chat => "chat",
        }
    }

    /// Lenient parse used on model output.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research" => Some(Self::Research),
            "qa" => Some(Self::Qa),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned, point-in-time copy of an execution's state.
///
/// Also the storage layout of [`ExecutionState`], so taking a snapshot is a
/// plain deep clone under the read lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub input: String,
    pub intent: Option<Intent>,
    pub topic: String,
    pub queries: Vec<String>,
    pub contents: BTreeMap<String, String>,
    pub report: String,
    pub current_node: String,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

struct Inner {
    data: StateSnapshot,
    emitter: Option<EventEmitter>,
}

/// Shared mutable state for one run.
///
/// Every accessor takes the single lock around the whole record: writers
/// exclusively, readers shared. Event emission clones the emitter out of the
/// lock and sends after releasing it.
pub struct ExecutionState {
    inner: RwLock<Inner>,
}

impl ExecutionState {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                data: StateSnapshot {
                    input: input.into(),
                    ..StateSnapshot::default()
                },
                emitter: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.read().data.clone()
    }

    pub fn input(&self) -> String {
        self.read().data.input.clone()
    }

    pub fn intent(&self) -> Option<Intent> {
        self.read().data.intent
    }

    pub fn topic(&self) -> String {
        self.read().data.topic.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.read().data.queries.clone()
    }

    pub fn query_count(&self) -> usize {
        self.read().data.queries.len()
    }

    pub fn contents(&self) -> BTreeMap<String, String> {
        self.read().data.contents.clone()
    }

    pub fn content_count(&self) -> usize {
        self.read().data.contents.len()
    }

    pub fn report(&self) -> String {
        self.read().data.report.clone()
    }

    pub fn current_node(&self) -> String {
        self.read().data.current_node.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.read().data.error.clone()
    }

    pub fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.read().data.metadata.get(key).cloned()
    }

    pub fn set_intent(&self, intent: Intent) {
        self.write().data.intent = Some(intent);
    }

    pub fn set_topic(&self, topic: impl Into<String>) {
        self.write().data.topic = topic.into();
    }

    pub fn append_query(&self, query: impl Into<String>) {
        self.write().data.queries.push(query.into());
    }

    /// Store content under `key`, replacing any previous value.
    pub fn set_content(&self, key: impl Into<String>, content: impl Into<String>) {
        self.write().data.contents.insert(key.into(), content.into());
    }

    pub fn set_report(&self, report: impl Into<String>) {
        self.write().data.report = report.into();
    }

    pub fn set_current_node(&self, node: impl Into<String>) {
        self.write().data.current_node = node.into();
    }

    /// Record the run's terminal error. Only the first call has an effect;
    /// returns whether this call set it.
    pub fn set_error(&self, error: impl Into<String>) -> bool {
        let mut inner = self.write();
        if inner.data.error.is_some() {
            return false;
        }
        inner.data.error = Some(error.into());
        true
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.write().data.metadata.insert(key.into(), value);
    }

    /// Install an emitter, returning the one it replaced.
    pub fn attach_emitter(&self, emitter: EventEmitter) -> Option<EventEmitter> {
        self.write().emitter.replace(emitter)
    }

    pub fn detach_emitter(&self) -> Option<EventEmitter> {
        self.write().emitter.take()
    }

    pub fn is_streaming(&self) -> bool {
        self.read().emitter.is_some()
    }

    /// Emit a progress event. Blocks on a full channel; no-op in silent mode.
    pub async fn emit(&self, kind: EventKind, node: &str) {
        let (emitter, snapshot) = {
            let inner = self.read();
            match &inner.emitter {
                Some(emitter) => (emitter.clone(), inner.data.clone()),
                None => return,
            }
        };
        emitter.emit(kind, node, snapshot).await;
    }

    /// Emit a streaming chunk for `node`. Dropped if the consumer is slow.
    pub async fn emit_chunk(&self, node: &str, chunk: String) {
        let (emitter, snapshot) = {
            let inner = self.read();
            match &inner.emitter {
                Some(emitter) => (emitter.clone(), inner.data.clone()),
                None => return,
            }
        };
        emitter.chunk(node, chunk, snapshot).await;
    }
}

impl fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("ExecutionState")
            .field("data", &inner.data)
            .field("streaming", &inner.emitter.is_some())
            .finish()
    }
}
