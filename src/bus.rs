use crate::events::CuratorEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CuratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CuratorEvent> {
        self.tx.subscribe()
    }

    /// Fails only when nobody is subscribed.
    pub fn publish(&self, event: CuratorEvent) -> Result<usize, broadcast::error::SendError<CuratorEvent>> {
        self.tx.send(event)
    }

    /// Publishes without caring whether anyone listens.
    pub fn emit(&self, event: CuratorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
