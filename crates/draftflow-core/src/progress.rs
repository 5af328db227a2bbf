//! Best-effort progress channel.
//!
//! A single broadcast channel fans progress events out to any number of
//! subscribers (WebSocket handlers, CLI spinners). Events carry a
//! per-session sequence number so consumers can detect drops; nothing in
//! the engine ever blocks on, or fails because of, this channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use draftflow_types::event::{ProgressEvent, ProgressKind};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<ProgressEvent>,
    seqs: Arc<DashMap<Uuid, AtomicU64>>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            seqs: Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Emit one event. Send failures (no subscribers) are ignored.
    pub fn emit(&self, session_id: Uuid, phase: &str, kind: ProgressKind, detail: Value) {
        let seq = self
            .seqs
            .entry(session_id)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(ProgressEvent {
            session_id,
            phase: phase.to_string(),
            kind,
            seq,
            detail,
        });
    }

    /// Drop the sequence counter for a finished session.
    pub fn forget(&self, session_id: Uuid) {
        self.seqs.remove(&session_id);
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn events_carry_monotonic_seq_per_session() {
        let channel = ProgressChannel::new();
        let mut rx = channel.subscribe();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        channel.emit(a, "intake", ProgressKind::Start, Value::Null);
        channel.emit(b, "intake", ProgressKind::Start, Value::Null);
        channel.emit(a, "generate_outline", ProgressKind::LlmStart, json!({"model": "m"}));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 0);
        assert_eq!(third.session_id, a);
        assert_eq!(third.seq, 1);
        assert_eq!(third.kind, ProgressKind::LlmStart);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let channel = ProgressChannel::new();
        channel.emit(Uuid::now_v7(), "intake", ProgressKind::Start, Value::Null);
    }
}
