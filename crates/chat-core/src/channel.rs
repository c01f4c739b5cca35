use tokio::sync::broadcast;
use tracing::trace;

use crate::types::SessionEvent;

/// Receiver half handed to renderers.
pub type EventStream = broadcast::Receiver<SessionEvent>;

/// Outbound side of a session: every component that publishes events holds a
/// clone. Commands travel on a separate queue owned by the session handle.
#[derive(Clone, Debug)]
pub struct SessionChannels {
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionChannels {
    pub fn new(event_buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        Self { event_tx }
    }

    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    /// Publish `event`; returns how many subscribers it reached.
    ///
    /// With nobody listening the event is dropped. Slow subscribers see
    /// `Lagged` on their stream rather than blocking the session.
    pub fn emit(&self, event: SessionEvent) -> usize {
        let kind = event.kind();
        let reached = self.event_tx.send(event).unwrap_or(0);
        trace!(kind, reached, "session event");
        reached
    }
}
