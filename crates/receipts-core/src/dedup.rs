use std::collections::HashSet;

use crate::ids::MessageId;

/// Ids already admitted into the pipeline.
///
/// Grows monotonically for the lifetime of the owning tracker; there is no
/// eviction. Callers serialize access so `insert` acts as test-and-set.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<MessageId>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`; returns false when it was already present.
    pub fn insert(&mut self, id: &MessageId) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.clone())
    }
}
