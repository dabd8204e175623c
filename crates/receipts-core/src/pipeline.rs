use std::sync::Arc;

use chrono::{DateTime, Utc};
use receipts_events::Bus;
use receipts_topics as topics;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::admission::ReceiptTracker;
use crate::batcher::Batcher;
use crate::config::{ConfigError, PipelineConfig};
use crate::dispatch::{Acknowledger, Dispatcher};
use crate::gate::NetworkGate;
use crate::ids::MessageId;
use crate::intake;
use crate::stats::StatsSnapshot;
use crate::tasks::TaskSet;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("no acknowledger configured")]
    MissingAcknowledger,
    #[error("tracker is already attached to a pipeline")]
    TrackerAttached,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    ack: Option<Arc<dyn Acknowledger>>,
    gate: Option<NetworkGate>,
    bus: Option<Bus>,
    tracker: Option<ReceiptTracker>,
}

impl PipelineBuilder {
    pub fn acknowledger(mut self, ack: Arc<dyn Acknowledger>) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Use an externally driven gate. Without one the gate is seeded from
    /// `start_online` and stays there until someone calls `set_online`.
    pub fn gate(mut self, gate: NetworkGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Attach a tracker that was handed out before the pipeline existed.
    pub fn tracker(mut self, tracker: ReceiptTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Spawn the batch and dispatch stages. Must run inside a tokio runtime.
    pub fn start(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        let ack = self.ack.ok_or(PipelineError::MissingAcknowledger)?;
        let gate = self
            .gate
            .unwrap_or_else(|| NetworkGate::new(self.config.start_online));
        let bus = self.bus.unwrap_or_default();
        let tracker = self.tracker.unwrap_or_else(ReceiptTracker::detached);
        let stats = tracker.stats().clone();

        let (intake_tx, intake_rx) = intake::channel();
        if !tracker.attach(intake_tx) {
            return Err(PipelineError::TrackerAttached);
        }
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let retry = self.config.retry_policy();

        let batcher = Batcher::new(
            self.config.max_batch_size,
            self.config.window(),
            stats.clone(),
            bus.clone(),
        );
        let dispatcher = Dispatcher::new(
            ack,
            gate.clone(),
            retry,
            stats,
            bus.clone(),
        );

        let mut tasks = TaskSet::new();
        tasks.spawn("receipts.batcher", batcher.run(intake_rx, batch_tx));
        tasks.spawn("receipts.dispatcher", dispatcher.run(batch_rx));
        tasks.spawn(
            "receipts.gate_observer",
            publish_gate_changes(gate.subscribe(), bus.clone()),
        );

        info!(
            max_batch_size = self.config.max_batch_size,
            window_ms = self.config.window_ms,
            retry_base_ms = retry.base().as_millis() as u64,
            retry_attempts = retry.max_attempts(),
            online = gate.is_open(),
            tasks = ?tasks.names(),
            "read-receipt pipeline started"
        );
        bus.publish(
            topics::TOPIC_PIPELINE_STARTED,
            &json!({"config": &self.config, "gate": gate.state()}),
        );

        Ok(Pipeline {
            tracker,
            bus,
            tasks,
        })
    }
}

/// A running read-receipt pipeline.
///
/// Dropping it (or calling [`Pipeline::shutdown`]) cancels the background
/// stages; ids still sitting in an open window are not sent.
pub struct Pipeline {
    tracker: ReceiptTracker,
    bus: Bus,
    tasks: TaskSet,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            ack: None,
            gate: None,
            bus: None,
            tracker: None,
        }
    }

    pub fn admit(&self, id: impl Into<MessageId>) -> bool {
        self.tracker.admit(id)
    }

    /// Cloneable admission handle for call sites that outlive a borrow.
    pub fn tracker(&self) -> ReceiptTracker {
        self.tracker.clone()
    }

    pub fn is_read(&self, id: &MessageId) -> bool {
        self.tracker.is_read(id)
    }

    pub fn read_at(&self, id: &MessageId) -> Option<DateTime<Utc>> {
        self.tracker.read_at(id)
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.tracker.stats().snapshot()
    }

    pub async fn shutdown(self) {
        let Pipeline {
            tracker,
            bus,
            tasks,
            ..
        } = self;
        tasks.shutdown().await;
        let stats = tracker.stats().snapshot();
        info!(?stats, "read-receipt pipeline stopped");
        bus.publish(topics::TOPIC_PIPELINE_STOPPED, &stats);
    }
}

async fn publish_gate_changes(mut rx: watch::Receiver<bool>, bus: Bus) {
    while rx.changed().await.is_ok() {
        let open = *rx.borrow_and_update();
        bus.publish(topics::TOPIC_GATE_CHANGED, &json!({"open": open}));
    }
}
