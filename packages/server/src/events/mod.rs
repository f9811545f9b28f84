//! Broadcast hub for applied mutations.
//!
//! The partition publishes every applied mutation (client-issued,
//! replicated, and GC deletions -- but not recovery replay, which
//! reconstructs old history). Consumers such as a realtime WebSocket
//! fan-out subscribe for [`MutationEvent`]s; the JSON form from
//! [`MutationEvent::to_json`] is their wire contract.
//!
//! The hub uses a broadcast channel: a subscriber that falls more than
//! the channel capacity behind loses the oldest events. Publishing
//! never blocks, so a slow subscriber cannot back-pressure the write
//! path.

use tokio::sync::broadcast;

use creek_core::MutationEvent;

/// Default event buffer per subscriber.
pub const HUB_CAPACITY: usize = 256;

/// Fan-out point for applied mutations.
pub struct MutationHub {
    tx: broadcast::Sender<MutationEvent>,
}

impl MutationHub {
    /// Creates a hub with the given per-subscriber buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Registers a new subscriber.
    ///
    /// The receiver observes only events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.tx.subscribe()
    }

    /// Publishes one applied mutation.
    ///
    /// A hub with no subscribers silently drops the event.
    pub fn publish(&self, event: MutationEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MutationHub {
    fn default() -> Self {
        Self::new(HUB_CAPACITY)
    }
}
