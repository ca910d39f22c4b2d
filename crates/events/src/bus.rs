//! In-process delivery of scenario events over a tokio broadcast channel

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::types::{Event, EventEnvelope};

/// Events buffered per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Fire-and-forget sink for scenario events.
///
/// No delivery acknowledgement is expected: publishing never fails and never
/// blocks the caller.
pub trait EventNotifier: Send + Sync {
    fn publish(&self, event: Event);
}

/// Broadcasts every scenario event to the subscribers alive at publish time.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Events published before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

impl EventNotifier for EventBus {
    fn publish(&self, event: Event) {
        let kind = event.kind();
        let scenario_id = event.scenario_id().to_string();
        match self.sender.send(EventEnvelope::new(event)) {
            Ok(receivers) => trace!(kind, %scenario_id, receivers, "Scenario event published"),
            Err(_) => debug!(kind, %scenario_id, "No subscriber for scenario event"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
