use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::state::StateSnapshot;

/// How long a streaming chunk may wait for channel capacity before it is dropped.
pub const CHUNK_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Chunks longer than this (in characters) are truncated.
pub const MAX_CHUNK_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Start,
    NodeStart,
    StreamingChunk { chunk: String },
    NodeComplete,
    Error { message: String },
    Complete,
}

/// One progress event of a streaming run.
#[derive(Debug, Clone, Serialize)]
pub struct GraphEvent {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub kind: EventKind,
    pub node: String,
    /// Set only on the run's last event: `Complete`, or the run-level `Error`.
    /// Failed fan-out branches also report `Error`, without this flag.
    #[serde(rename = "final")]
    pub terminal: bool,
    pub state: StateSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Sending half of a run's event channel.
#[derive(Clone)]
pub struct EventEmitter {
    run_id: Uuid,
    tx: mpsc::Sender<GraphEvent>,
}

impl EventEmitter {
    pub fn new(run_id: Uuid, tx: mpsc::Sender<GraphEvent>) -> Self {
        Self { run_id, tx }
    }

    fn event(&self, kind: EventKind, node: &str, state: StateSnapshot) -> GraphEvent {
        GraphEvent {
            run_id: self.run_id,
            kind,
            node: node.to_string(),
            terminal: false,
            state,
            timestamp: Utc::now(),
        }
    }

    /// Deliver an event, waiting for capacity. Returns false if the receiver is gone.
    pub async fn emit(&self, kind: EventKind, node: &str, state: StateSnapshot) -> bool {
        let event = self.event(kind, node, state);
        if self.tx.send(event).await.is_err() {
            debug!(node, "Event receiver dropped");
            return false;
        }
        true
    }

    /// Deliver the run's final event and release the sender.
    pub async fn finish(self, kind: EventKind, node: &str, state: StateSnapshot) -> bool {
        let event = GraphEvent {
            terminal: true,
            ..self.event(kind, node, state)
        };
        if self.tx.send(event).await.is_err() {
            debug!(node, "Event receiver dropped before final event");
            return false;
        }
        true
    }

    /// Deliver a streaming chunk, giving up after [`CHUNK_SEND_TIMEOUT`].
    pub async fn chunk(&self, node: &str, chunk: String, state: StateSnapshot) -> bool {
        let kind = EventKind::StreamingChunk {
            chunk: truncate_chunk(chunk),
        };
        let event = self.event(kind, node, state);
        match tokio::time::timeout(CHUNK_SEND_TIMEOUT, self.tx.send(event)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => false,
            Err(_) => {
                debug!(node, "Dropping streaming chunk, consumer too slow");
                false
            }
        }
    }
}

fn truncate_chunk(chunk: String) -> String {
    match chunk.char_indices().nth(MAX_CHUNK_CHARS) {
        Some((cut, _)) => format!("{}...", &chunk[..cut]),
        None => chunk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter(capacity: usize) -> (EventEmitter, mpsc::Receiver<GraphEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (EventEmitter::new(Uuid::new_v4(), tx), rx)
    }

    #[test]
    fn test_truncate_chunk() {
        assert_eq!(truncate_chunk("short".into()), "short");

        let exact = "a".repeat(MAX_CHUNK_CHARS);
        assert_eq!(truncate_chunk(exact.clone()), exact);

        let long = "é".repeat(MAX_CHUNK_CHARS + 10);
        let cut = truncate_chunk(long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), MAX_CHUNK_CHARS + 3);
    }

    #[tokio::test]
    async fn test_chunk_dropped_when_channel_full() {
        let (emitter, mut rx) = emitter(1);
        assert!(emitter.emit(EventKind::Start, "", StateSnapshot::default()).await);

        let started = std::time::Instant::now();
        let delivered = emitter
            .chunk("handle_chat", "lost".into(), StateSnapshot::default())
            .await;
        assert!(!delivered);
        assert!(started.elapsed() >= CHUNK_SEND_TIMEOUT);

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Start);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_progress_event_waits_for_capacity() {
        let (emitter, mut rx) = emitter(1);
        emitter.emit(EventKind::Start, "", StateSnapshot::default()).await;

        let consumer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let mut kinds = Vec::new();
            while let Some(event) = rx.recv().await {
                kinds.push(event.kind);
            }
            kinds
        });

        // Waits well past the chunk timeout instead of dropping.
        assert!(emitter.emit(EventKind::NodeStart, "n", StateSnapshot::default()).await);
        drop(emitter);

        let kinds = consumer.await.unwrap();
        assert_eq!(kinds, vec![EventKind::Start, EventKind::NodeStart]);
    }

    #[test]
    fn test_event_json_shape() {
        let (emitter, _rx) = emitter(1);
        let event = emitter.event(
            EventKind::StreamingChunk { chunk: "hi".into() },
            "handle_chat",
            StateSnapshot::default(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "streaming_chunk");
        assert_eq!(json["chunk"], "hi");
        assert_eq!(json["node"], "handle_chat");
        assert_eq!(json["final"], false);
        assert!(json["timestamp"].is_string());
        assert!(json["state"]["contents"].is_object());
    }

    #[tokio::test]
    async fn test_only_finish_marks_final_event() {
        let (emitter, mut rx) = emitter(4);
        let failed_branch = EventKind::Error {
            message: "branch timed out".into(),
        };
        emitter
            .emit(failed_branch, "search_query_1", StateSnapshot::default())
            .await;
        emitter
            .finish(EventKind::Complete, "merge_search_results", StateSnapshot::default())
            .await;

        let branch = rx.recv().await.unwrap();
        assert!(matches!(branch.kind, EventKind::Error { .. }));
        assert!(!branch.terminal);

        let last = rx.recv().await.unwrap();
        assert_eq!(last.kind, EventKind::Complete);
        assert!(last.terminal);
        assert_eq!(serde_json::to_value(&last).unwrap()["final"], true);

        // `finish` consumed the only sender.
        assert!(rx.recv().await.is_none());
    }
}
