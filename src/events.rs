use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

pub type JobId = String;
pub type BatchId = String;

/// Everything the engine reports back to the front-end. Events are queued
/// on a bounded channel and drained by the consumer on its own tick, so
/// workers never touch presentation state directly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiEvent {
    JobQueued {
        id: JobId,
        url: String,
    },
    JobStarted {
        id: JobId,
        url: String,
    },
    JobProgress {
        id: JobId,
        percent: f64,
        speed: String,
        eta: String,
    },
    JobFinished {
        id: JobId,
        output: Option<PathBuf>,
    },
    JobFailed {
        id: JobId,
        error: String,
        restricted: bool,
    },
    JobCancelled {
        id: JobId,
    },
    BatchProgress {
        batch: BatchId,
        completed: usize,
        total: usize,
    },
    BatchFinished {
        batch: BatchId,
        completed: usize,
        total: usize,
    },
    Notice {
        text: String,
    },
}

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub fn channel() -> (EventBus, EventDrain) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (EventBus { tx }, EventDrain { rx })
}

/// Producer half handed to workers.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<UiEvent>,
}

impl EventBus {
    pub async fn emit(&self, event: UiEvent) {
        if self.tx.send(event).await.is_err() {
            log::debug!("event dropped: consumer gone");
        }
    }
}

/// Consumer half owned by the front-end loop.
pub struct EventDrain {
    rx: mpsc::Receiver<UiEvent>,
}

impl EventDrain {
    /// Collect everything currently queued without blocking; called on the
    /// front-end's fixed tick.
    pub fn drain(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn recv(&mut self) -> Option<UiEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_collects_pending_events_in_order() {
        let (bus, mut drain) = channel();
        bus.emit(UiEvent::Notice { text: "one".into() }).await;
        bus.emit(UiEvent::Notice { text: "two".into() }).await;
        let events = drain.drain();
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (UiEvent::Notice { text: a }, UiEvent::Notice { text: b }) => {
                assert_eq!(a, "one");
                assert_eq!(b, "two");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn drain_on_empty_channel_is_empty() {
        let (_bus, mut drain) = channel();
        assert!(drain.drain().is_empty());
    }

    #[tokio::test]
    async fn emit_after_consumer_dropped_does_not_panic() {
        let (bus, drain) = channel();
        drop(drain);
        bus.emit(UiEvent::Notice { text: "late".into() }).await;
    }
}
