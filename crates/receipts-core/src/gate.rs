use std::future::Future;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Open,
    Closed,
}

/// Connectivity latch in front of the dispatcher.
///
/// Only the connectivity observer writes the state; waiters are released in
/// the order they called [`NetworkGate::when_open`].
#[derive(Clone)]
pub struct NetworkGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    state: watch::Sender<bool>,
    // tokio's Mutex hands out the lock in FIFO order
    turnstile: Mutex<()>,
}

impl NetworkGate {
    pub fn new(initially_open: bool) -> Self {
        let (state, _rx) = watch::channel(initially_open);
        Self {
            inner: Arc::new(GateInner {
                state,
                turnstile: Mutex::new(()),
            }),
        }
    }

    pub fn open() -> Self {
        Self::new(true)
    }

    pub fn closed() -> Self {
        Self::new(false)
    }

    pub fn state(&self) -> GateState {
        if self.is_open() {
            GateState::Open
        } else {
            GateState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// Feed a connectivity reading. Returns true when the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.inner.state.send_if_modified(|open| {
            if *open == online {
                false
            } else {
                *open = online;
                true
            }
        });
        if changed {
            info!(online, "network gate changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    /// Wait until the gate is open, respecting FIFO order among waiters.
    pub async fn wait_open(&self) {
        let _ticket = self.inner.turnstile.lock().await;
        let mut rx = self.inner.state.subscribe();
        if !*rx.borrow() {
            debug!("waiting for network gate to open");
        }
        // The sender lives in `inner`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|open| *open).await;
    }

    /// Run `op` once the gate is open.
    pub async fn when_open<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.wait_open().await;
        op().await
    }

    /// Drive the gate from a stream of online/offline readings until it ends.
    pub async fn follow<S>(&self, readings: S)
    where
        S: Stream<Item = bool>,
    {
        futures_util::pin_mut!(readings);
        while let Some(online) = readings.next().await {
            self.set_online(online);
        }
        debug!("connectivity stream ended");
    }
}
