use once_cell::sync::OnceCell;
use tokio::sync::mpsc;

use crate::ids::MessageId;

/// Producer half of the unbounded intake queue. Cloneable, never blocks.
#[derive(Debug, Clone)]
pub struct IntakeSender {
    tx: mpsc::UnboundedSender<MessageId>,
}

/// Single consumer half, owned by the batcher.
#[derive(Debug)]
pub struct IntakeReceiver {
    rx: mpsc::UnboundedReceiver<MessageId>,
}

pub fn channel() -> (IntakeSender, IntakeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IntakeSender { tx }, IntakeReceiver { rx })
}

impl IntakeSender {
    /// Returns false when the consumer is gone.
    pub fn offer(&self, id: MessageId) -> bool {
        self.tx.send(id).is_ok()
    }
}

impl IntakeReceiver {
    pub async fn next(&mut self) -> Option<MessageId> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<MessageId> {
        self.rx.try_recv().ok()
    }
}

/// Outcome of offering an admitted id to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// No consumer attached yet, or the consumer has shut down.
    Dropped,
}

/// Late-bound slot for the intake sender.
///
/// Admission handles exist before the dispatch side is running; offers made
/// while the slot is empty are dropped rather than buffered.
#[derive(Debug, Default)]
pub(crate) struct IntakeSlot {
    sender: OnceCell<IntakeSender>,
}

impl IntakeSlot {
    pub(crate) fn attach(&self, sender: IntakeSender) -> bool {
        self.sender.set(sender).is_ok()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.sender.get().is_some()
    }

    pub(crate) fn offer(&self, id: MessageId) -> Offer {
        match self.sender.get() {
            Some(sender) if sender.offer(id) => Offer::Queued,
            _ => Offer::Dropped,
        }
    }
}
