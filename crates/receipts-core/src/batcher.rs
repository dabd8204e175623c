use std::sync::Arc;
use std::time::Duration;

use receipts_events::Bus;
use receipts_topics as topics;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::ids::{Batch, MessageId};
use crate::intake::IntakeReceiver;
use crate::stats::PipelineStats;

/// Buffer for the window currently open.
#[derive(Debug)]
pub struct Window {
    buffered: Vec<MessageId>,
    max: usize,
}

impl Window {
    pub fn new(max: usize) -> Self {
        Self {
            buffered: Vec::new(),
            max: max.max(1),
        }
    }

    /// Buffer `id`; hands back the full window once it reaches the size bound.
    pub fn push(&mut self, id: MessageId) -> Option<Vec<MessageId>> {
        self.buffered.push(id);
        if self.buffered.len() >= self.max {
            Some(self.take())
        } else {
            None
        }
    }

    /// Close the window on its timer. Empty windows produce nothing.
    pub fn flush(&mut self) -> Option<Vec<MessageId>> {
        if self.buffered.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    pub fn len(&self) -> usize {
        self.buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }

    fn take(&mut self) -> Vec<MessageId> {
        std::mem::take(&mut self.buffered)
    }
}

/// Count-or-time windowing stage between intake and dispatch.
pub(crate) struct Batcher {
    window: Window,
    period: Duration,
    next_seq: u64,
    stats: Arc<PipelineStats>,
    bus: Bus,
}

impl Batcher {
    pub(crate) fn new(max: usize, period: Duration, stats: Arc<PipelineStats>, bus: Bus) -> Self {
        Self {
            window: Window::new(max),
            period,
            next_seq: 1,
            stats,
            bus,
        }
    }

    /// Consume intake until it closes or the downstream goes away.
    ///
    /// The window timer restarts whenever a window closes, whether by size or
    /// by time, and also after an empty tick. Anything still buffered when the
    /// loop exits is dropped.
    pub(crate) async fn run(
        mut self,
        mut intake: IntakeReceiver,
        batches: mpsc::UnboundedSender<Batch>,
    ) {
        let deadline = tokio::time::sleep(self.period);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                next = intake.next() => {
                    let Some(id) = next else {
                        debug!(dropped = self.window.len(), "intake closed; batcher stopping");
                        return;
                    };
                    trace!(id = %id, buffered = self.window.len() + 1, "buffered id");
                    if let Some(ids) = self.window.push(id) {
                        if !self.emit(ids, "size", &batches) {
                            return;
                        }
                        deadline.as_mut().reset(Instant::now() + self.period);
                    }
                }
                () = &mut deadline => {
                    if let Some(ids) = self.window.flush() {
                        if !self.emit(ids, "time", &batches) {
                            return;
                        }
                    }
                    deadline.as_mut().reset(Instant::now() + self.period);
                }
            }
        }
    }

    fn emit(
        &mut self,
        ids: Vec<MessageId>,
        reason: &'static str,
        batches: &mpsc::UnboundedSender<Batch>,
    ) -> bool {
        let batch = Batch::new(self.next_seq, ids);
        self.next_seq += 1;
        self.stats.record_batch_formed();
        debug!(batch = batch.seq(), size = batch.len(), reason, "window closed");
        self.bus.publish(
            topics::TOPIC_BATCH_FORMED,
            &json!({"batch": batch.seq(), "size": batch.len(), "reason": reason}),
        );
        if batches.send(batch).is_err() {
            debug!("dispatcher gone; batcher stopping");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake;
    use tokio::time::{advance, sleep};

    fn ids(names: &[&str]) -> Vec<MessageId> {
        names.iter().map(|n| MessageId::from(*n)).collect()
    }

    fn spawn_batcher(
        max: usize,
        period: Duration,
        bus: &Bus,
    ) -> (
        intake::IntakeSender,
        mpsc::UnboundedReceiver<Batch>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = intake::channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let batcher = Batcher::new(max, period, Arc::new(PipelineStats::new()), bus.clone());
        let handle = tokio::spawn(batcher.run(rx, out_tx));
        (tx, out_rx, handle)
    }

    #[test]
    fn window_closes_at_size_bound() {
        let mut window = Window::new(3);
        assert_eq!(window.push(MessageId::from("a")), None);
        assert_eq!(window.push(MessageId::from("b")), None);
        assert_eq!(window.push(MessageId::from("c")), Some(ids(&["a", "b", "c"])));
        assert!(window.is_empty());
        assert_eq!(window.flush(), None);
    }

    #[test]
    fn huge_bound_does_not_preallocate() {
        let mut window = Window::new(usize::MAX);
        assert_eq!(window.push(MessageId::from("only")), None);
        assert_eq!(window.len(), 1);
        assert_eq!(window.flush(), Some(ids(&["only"])));
    }

    #[tokio::test(start_paused = true)]
    async fn sparse_ids_flush_on_timer_in_order() {
        let (tx, mut out, _h) = spawn_batcher(25, Duration::from_secs(5), &Bus::new(16));
        let start = Instant::now();
        for id in ["A", "B", "C"] {
            tx.offer(MessageId::from(id));
        }
        sleep(Duration::from_secs(1)).await;
        tx.offer(MessageId::from("D"));

        let batch = out.recv().await.expect("batch");
        assert_eq!(batch.ids(), ids(&["A", "B", "C", "D"]).as_slice());
        assert_eq!(batch.seq(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn dense_stream_splits_at_size_bound() {
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let (tx, mut out, _h) = spawn_batcher(25, Duration::from_secs(5), &bus);
        let start = Instant::now();
        for i in 0..60 {
            tx.offer(MessageId::new(format!("m{i:02}")));
        }
        let first = out.recv().await.unwrap();
        let second = out.recv().await.unwrap();
        assert_eq!(first.len(), 25);
        assert_eq!(second.len(), 25);
        assert_eq!(start.elapsed(), Duration::ZERO, "size-bound windows close immediately");
        assert_eq!(first.ids()[0], MessageId::from("m00"));
        assert_eq!(second.ids()[0], MessageId::from("m25"));

        let rest = out.recv().await.unwrap();
        assert_eq!(rest.len(), 10);
        assert_eq!(rest.seq(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        let formed: Vec<(u64, u64, String)> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.kind == topics::TOPIC_BATCH_FORMED)
            .map(|e| {
                (
                    e.payload["batch"].as_u64().unwrap(),
                    e.payload["size"].as_u64().unwrap(),
                    e.payload["reason"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            formed,
            vec![
                (1, 25, "size".to_string()),
                (2, 25, "size".to_string()),
                (3, 10, "time".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_tick_restarts_timer() {
        let (tx, mut out, _h) = spawn_batcher(25, Duration::from_secs(5), &Bus::new(16));
        let start = Instant::now();
        // first tick at 5s finds nothing; the id lands in the window opened then
        sleep(Duration::from_secs(6)).await;
        tx.offer(MessageId::from("late"));
        let batch = out.recv().await.unwrap();
        assert_eq!(batch.ids(), ids(&["late"]).as_slice());
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_window_dropped_when_intake_closes() {
        let (tx, mut out, handle) = spawn_batcher(25, Duration::from_secs(5), &Bus::new(16));
        tx.offer(MessageId::from("orphan"));
        tokio::task::yield_now().await;
        drop(tx);
        handle.await.unwrap();
        advance(Duration::from_secs(10)).await;
        assert!(out.recv().await.is_none());
    }
}
