use invoke_common::InvocationEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Fan-out of session lifecycle events.
pub trait EventService: Send + Sync {
    /// Publish an event. Never fails; events with no listener are dropped.
    fn dispatch(&self, event: InvocationEvent);
}

/// In-process event bus backed by a tokio broadcast channel.
///
/// Slow subscribers lag and miss events rather than blocking publishers.
pub struct BroadcastEventService {
    sender: broadcast::Sender<InvocationEvent>,
}

impl BroadcastEventService {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvocationEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventService {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventService for BroadcastEventService {
    fn dispatch(&self, event: InvocationEvent) {
        trace!(
            event = event.event_type_str(),
            session_id = event.graph_execution_state_id(),
            "dispatch"
        );
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }
}
