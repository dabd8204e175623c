use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque message identifier; the dedup and batching key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An ordered group of ids acknowledged together in one remote call.
///
/// Batches are immutable once the batcher closes their window; `seq` grows
/// monotonically per pipeline and is only used for logs and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    seq: u64,
    ids: Vec<MessageId>,
}

impl Batch {
    pub fn new(seq: u64, ids: Vec<MessageId>) -> Self {
        debug_assert!(!ids.is_empty(), "batches are never empty");
        Self { seq, ids }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
