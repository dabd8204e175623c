use std::sync::Arc;

use async_trait::async_trait;
use receipts_events::Bus;
use receipts_topics as topics;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::gate::NetworkGate;
use crate::ids::{Batch, MessageId};
use crate::retry::RetryPolicy;
use crate::stats::PipelineStats;


#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint returned status {status}")]
    Status { status: u16 },
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Remote acknowledgement endpoint. Must be idempotent: the same id may be
/// sent more than once across retries.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn mark_as_read(&self, ids: &[MessageId]) -> Result<(), AckError>;
}

/// Terminal state of one batch's attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: AckError },
}

impl DeliveryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Sends batches one at a time, gated on connectivity, with bounded retry.
#[derive(Clone)]
pub struct Dispatcher {
    ack: Arc<dyn Acknowledger>,
    gate: NetworkGate,
    retry: RetryPolicy,
    stats: Arc<PipelineStats>,
    bus: Bus,
}

impl Dispatcher {
    pub fn new(
        ack: Arc<dyn Acknowledger>,
        gate: NetworkGate,
        retry: RetryPolicy,
        stats: Arc<PipelineStats>,
        bus: Bus,
    ) -> Self {
        Self {
            ack,
            gate,
            retry,
            stats,
            bus,
        }
    }

    /// Drive one batch to a terminal state. Every attempt waits for the gate,
    /// so a connection lost mid-sequence parks the retry rather than burning it.
    pub async fn deliver(&self, batch: &Batch) -> DeliveryOutcome {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = self
                .gate
                .when_open(|| {
                    self.stats.record_attempt();
                    debug!(target: topics::DELIVERY_LOG_TARGET, batch = batch.seq(), attempt, "sending acknowledgement");
                    self.ack.mark_as_read(batch.ids())
                })
                .await;
            match result {
                Ok(()) => {
                    self.stats.record_delivered(batch.len());
                    info!(target: topics::DELIVERY_LOG_TARGET, batch = batch.seq(), size = batch.len(), attempts = attempt, "batch acknowledged");
                    self.bus.publish(
                        topics::TOPIC_BATCH_DELIVERED,
                        &json!({"batch": batch.seq(), "size": batch.len(), "attempts": attempt}),
                    );
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(err) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        target: topics::DELIVERY_LOG_TARGET,
                        batch = batch.seq(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "acknowledgement failed; retrying"
                    );
                    self.bus.publish(
                        topics::TOPIC_BATCH_RETRYING,
                        &json!({
                            "batch": batch.seq(),
                            "attempt": attempt,
                            "delay_ms": delay.as_millis() as u64,
                            "error": err.to_string(),
                        }),
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.stats.record_failed(batch.len());
                    error!(
                        target: topics::DELIVERY_LOG_TARGET,
                        batch = batch.seq(),
                        size = batch.len(),
                        attempts = attempt,
                        error = %err,
                        "acknowledgement abandoned after final attempt"
                    );
                    self.bus.publish(
                        topics::TOPIC_BATCH_FAILED,
                        &json!({
                            "batch": batch.seq(),
                            "size": batch.len(),
                            "attempts": attempt,
                            "error": err.to_string(),
                        }),
                    );
                    return DeliveryOutcome::Failed {
                        attempts: attempt,
                        error: err,
                    };
                }
            }
        }
    }

    /// Sequential consume loop: the next batch starts only after the previous
    /// one reached a terminal state.
    pub(crate) async fn run(self, mut batches: mpsc::UnboundedReceiver<Batch>) {
        while let Some(batch) = batches.recv().await {
            let outcome = self.deliver(&batch).await;
            debug!(
                batch = batch.seq(),
                delivered = outcome.is_delivered(),
                attempts = outcome.attempts(),
                "batch settled"
            );
        }
        debug!("batch channel closed; dispatcher stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays scripted results and records when each call happened.
    struct Scripted {
        script: Mutex<VecDeque<Result<(), AckError>>>,
        calls: Mutex<Vec<(Instant, Vec<MessageId>)>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<(), AckError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Acknowledger for Scripted {
        async fn mark_as_read(&self, ids: &[MessageId]) -> Result<(), AckError> {
            self.calls.lock().push((Instant::now(), ids.to_vec()));
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    fn dispatcher(ack: Arc<Scripted>, gate: NetworkGate) -> Dispatcher {
        Dispatcher::new(
            ack,
            gate,
            RetryPolicy::new(Duration::from_millis(500), 3),
            Arc::new(PipelineStats::new()),
            Bus::new(16),
        )
    }

    fn batch(seq: u64, ids: &[&str]) -> Batch {
        Batch::new(seq, ids.iter().map(|s| MessageId::from(*s)).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn retries_follow_exponential_schedule() {
        let transient = || Err(AckError::Transport("reset".into()));
        let ack = Scripted::new(vec![transient(), transient(), Ok(())]);
        let d = dispatcher(ack.clone(), NetworkGate::open());

        let outcome = d.deliver(&batch(1, &["a"])).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });

        let calls = ack.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].0 - calls[0].0, Duration::from_millis(500));
        assert_eq!(calls[2].0 - calls[1].0, Duration::from_millis(1000));
        assert_eq!(d.stats.snapshot().attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_batch_reports_failure_and_stops() {
        let status = || Err(AckError::Status { status: 503 });
        let ack = Scripted::new(vec![status(), status(), status(), Ok(())]);
        let d = dispatcher(ack.clone(), NetworkGate::open());
        let mut events = d.bus.subscribe();

        let outcome = d.deliver(&batch(4, &["x", "y"])).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                attempts: 3,
                error: AckError::Status { status: 503 }
            }
        );
        assert_eq!(ack.calls.lock().len(), 3, "no attempt past the limit");
        assert_eq!(d.stats.snapshot().batches_failed, 1);

        let kinds: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                topics::TOPIC_BATCH_RETRYING,
                topics::TOPIC_BATCH_RETRYING,
                topics::TOPIC_BATCH_FAILED
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_isolates_terminal_failures() {
        let fail = || Err(AckError::Rejected("bad id".into()));
        let ack = Scripted::new(vec![fail(), fail(), fail(), Ok(())]);
        let d = dispatcher(ack.clone(), NetworkGate::open());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(batch(1, &["bad"])).unwrap();
        tx.send(batch(2, &["good"])).unwrap();
        drop(tx);
        d.clone().run(rx).await;

        let calls = ack.calls.lock();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3].1, vec![MessageId::from("good")]);
        let stats = d.stats.snapshot();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.batches_delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_gate_parks_delivery() {
        let ack = Scripted::new(vec![]);
        let gate = NetworkGate::closed();
        let d = dispatcher(ack.clone(), gate.clone());
        let task = tokio::spawn({
            let d = d.clone();
            async move { d.deliver(&batch(1, &["a"])).await }
        });
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(ack.calls.lock().is_empty());
        gate.set_online(true);
        assert!(task.await.unwrap().is_delivered());
        assert_eq!(ack.calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_for_gate_closed_during_backoff() {
        let ack = Scripted::new(vec![Err(AckError::Transport("reset".into())), Ok(())]);
        let gate = NetworkGate::open();
        let d = dispatcher(ack.clone(), gate.clone());
        let start = Instant::now();
        let task = tokio::spawn({
            let d = d.clone();
            async move { d.deliver(&batch(1, &["a"])).await }
        });

        // first attempt fails at once; the 500ms backoff is now running
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ack.calls.lock().len(), 1);
        gate.set_online(false);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ack.calls.lock().len(), 1, "no retry while offline");
        assert_eq!(d.stats.snapshot().attempts, 1, "parked retry does not spend an attempt");

        gate.set_online(true);
        let outcome = task.await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
        let calls = ack.calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0 - start >= Duration::from_secs(30));
        assert_eq!(d.stats.snapshot().attempts, 2);
    }
}
