use tokio::sync::broadcast;

use alcove_types::events::GatewayEvent;

/// Fan-out hub for gateway events. API handlers publish here after every
/// committed write; each connected client holds a subscription and
/// filters by its own chat set.
#[derive(Clone)]
pub struct Dispatcher {
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self { broadcast_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Publish an event to all connections. Dropped silently when nobody
    /// is connected.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.broadcast_tx.send(event);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
