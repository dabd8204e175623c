use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Pipeline-wide counters, shared by every stage.
#[derive(Debug, Default)]
pub struct PipelineStats {
    admitted: AtomicU64,
    duplicates: AtomicU64,
    dropped_offers: AtomicU64,
    batches_formed: AtomicU64,
    batches_delivered: AtomicU64,
    batches_failed: AtomicU64,
    ids_delivered: AtomicU64,
    ids_failed: AtomicU64,
    attempts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub admitted: u64,
    pub duplicates: u64,
    pub dropped_offers: u64,
    pub batches_formed: u64,
    pub batches_delivered: u64,
    pub batches_failed: u64,
    pub ids_delivered: u64,
    pub ids_failed: u64,
    pub attempts: u64,
}

impl StatsSnapshot {
    /// Every queued id has reached a terminal delivery state.
    pub fn is_settled(&self) -> bool {
        self.ids_delivered + self.ids_failed + self.dropped_offers >= self.admitted
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_offer(&self) {
        self.dropped_offers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_formed(&self) {
        self.batches_formed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, ids: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.ids_delivered.fetch_add(ids as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, ids: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.ids_failed.fetch_add(ids as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dropped_offers: self.dropped_offers.load(Ordering::Relaxed),
            batches_formed: self.batches_formed.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            ids_delivered: self.ids_delivered.load(Ordering::Relaxed),
            ids_failed: self.ids_failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_once_every_admitted_id_is_accounted_for() {
        let stats = PipelineStats::new();
        for _ in 0..3 {
            stats.record_admitted();
        }
        stats.record_dropped_offer();
        assert!(!stats.snapshot().is_settled());
        stats.record_delivered(1);
        stats.record_failed(1);
        let snap = stats.snapshot();
        assert!(snap.is_settled());
        assert_eq!(snap.batches_delivered, 1);
        assert_eq!(snap.ids_failed, 1);
    }
}
