use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::ids::MessageId;

/// Local "read" view shown before (or regardless of) server confirmation.
///
/// Entries are add-only: the pipeline never removes or rewrites a timestamp,
/// even when delivery of the corresponding batch fails for good.
#[derive(Debug, Default)]
pub struct OptimisticReadState {
    entries: RwLock<HashMap<MessageId, DateTime<Utc>>>,
}

impl OptimisticReadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `id` with `at` unless it is already marked. Returns true on insert.
    pub(crate) fn mark(&self, id: &MessageId, at: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(id) {
            return false;
        }
        entries.insert(id.clone(), at);
        true
    }

    pub fn read_at(&self, id: &MessageId) -> Option<DateTime<Utc>> {
        self.entries.read().get(id).copied()
    }

    pub fn is_read(&self, id: &MessageId) -> bool {
        self.entries.read().contains_key(id)
    }

}
