use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::trace;

use crate::dedup::DedupSet;
use crate::ids::MessageId;
use crate::intake::{IntakeSender, IntakeSlot, Offer};
use crate::optimistic::OptimisticReadState;
use crate::stats::PipelineStats;

/// Admission handle handed to visibility and focus call sites.
///
/// Cheap to clone; every clone shares one dedup set, one optimistic view and
/// one intake slot, so an id is admitted at most once per tracker no matter
/// how many call sites race on it.
#[derive(Clone)]
pub struct ReceiptTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    admitted: Mutex<DedupSet>,
    read_state: OptimisticReadState,
    intake: IntakeSlot,
    stats: Arc<PipelineStats>,
}

impl ReceiptTracker {
    /// A tracker with no intake consumer yet; admissions only update the local view.
    pub fn detached() -> Self {
        Self::with_stats(Arc::new(PipelineStats::new()))
    }

    pub(crate) fn with_stats(stats: Arc<PipelineStats>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                admitted: Mutex::new(DedupSet::new()),
                read_state: OptimisticReadState::new(),
                intake: IntakeSlot::default(),
                stats,
            }),
        }
    }

    /// Admit `id` for delivery. Returns false if it was admitted before.
    ///
    /// The dedup check, optimistic write and queue offer happen under one
    /// lock, so intake order always matches admission order.
    pub fn admit(&self, id: impl Into<MessageId>) -> bool {
        self.admit_at(id.into(), Utc::now())
    }

    pub(crate) fn admit_at(&self, id: MessageId, at: DateTime<Utc>) -> bool {
        let mut admitted = self.inner.admitted.lock();
        if !admitted.insert(&id) {
            drop(admitted);
            self.inner.stats.record_duplicate();
            trace!(id = %id, "duplicate admission ignored");
            return false;
        }
        self.inner.read_state.mark(&id, at);
        self.inner.stats.record_admitted();
        if self.inner.intake.offer(id.clone()) == Offer::Dropped {
            self.inner.stats.record_dropped_offer();
            trace!(id = %id, "intake not attached; offer dropped");
        }
        true
    }

    pub fn is_read(&self, id: &MessageId) -> bool {
        self.inner.read_state.is_read(id)
    }

    pub fn read_at(&self, id: &MessageId) -> Option<DateTime<Utc>> {
        self.inner.read_state.read_at(id)
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.inner.stats
    }

    pub fn is_attached(&self) -> bool {
        self.inner.intake.is_attached()
    }

    /// Bind the intake consumer. Returns false if one was bound already.
    pub(crate) fn attach(&self, sender: IntakeSender) -> bool {
        self.inner.intake.attach(sender)
    }
}
