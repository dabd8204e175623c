use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub const DEFAULT_CAPACITY: usize = 256;

/// Event envelope stamped with RFC3339 time.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

/// Broadcast bus for pipeline lifecycle and delivery events.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// simply discarded, and slow subscribers observe `RecvError::Lagged`.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let val =
            serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({"_ser":"error"}));
        if self
            .tx
            .send(Envelope {
                time: now,
                kind: kind.to_string(),
                payload: val,
            })
            .is_err()
        {
            tracing::trace!(kind, "event dropped: no subscribers");
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
