//! In-process fan-out of tree events.

use super::{EventEmitter, TreeEvent};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 1024;

/// Broadcast channel of [`TreeEvent`]s for one hierarchy.
///
/// Emitting never blocks and never fails: with no listener the event is
/// dropped, and a listener that falls more than the capacity behind sees
/// `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TreeEvent>,
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: TreeEvent) {
        let summary = format!("{:?} {}/{}", event.kind, event.root_id, event.node_id);
        match self.tx.send(event) {
            Ok(listeners) => debug!(event = %summary, listeners, "Tree event emitted"),
            Err(_) => debug!(event = %summary, "Tree event dropped, no listeners"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }
}
