//! Broadcast channel for domain events.
//!
//! Every service holds a clone of the [`EventBus`] and publishes a
//! [`SyncEvent`] after each state mutation. Subscribers are in-process
//! observers (tests, audit hooks); delivery is best-effort and nothing
//! in the request path waits on it.

use tokio::sync::broadcast;

use super::SyncEvent;

/// Channel capacity used by [`EventBus::default`]. Matches the
/// `EVENT_BUS_CAPACITY` configuration default.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Cloneable handle to a broadcast channel of [`SyncEvent`]s.
///
/// All clones feed the same ring buffer. Once the buffer is full, a
/// lagging receiver loses the oldest events rather than blocking the
/// publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus whose ring buffer holds `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event, returning how many receivers got it.
    ///
    /// With no live receivers the event is dropped and 0 is returned;
    /// publishing never fails and never blocks.
    pub fn publish(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Opens a receiver for all events published from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Number of currently live receivers across all clones.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::operation::OperationId;
    use chrono::Utc;

    fn cancelled(operation_id: OperationId) -> SyncEvent {
        SyncEvent::OperationCancelled {
            operation_id,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn publish_without_receivers_drops_event() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(cancelled(OperationId::new())), 0);
    }

    #[tokio::test]
    async fn cloned_handles_share_the_channel() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let handle = bus.clone();
        let delivered = handle.publish(cancelled(OperationId::new()));
        assert_eq!(delivered, 1);

        let Ok(event) = rx.recv().await else {
            panic!("receiver should see events published through a clone");
        };
        assert_eq!(event.event_type_str(), "operation_cancelled");
    }

    #[tokio::test]
    async fn subscriber_sees_typed_payload() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(SyncEvent::QueueDrained {
            claimed: 5,
            completed: 4,
            failed: 1,
            timestamp: Utc::now(),
        });

        let Ok(SyncEvent::QueueDrained {
            claimed, completed, ..
        }) = rx.recv().await
        else {
            panic!("expected a queue_drained event");
        };
        assert_eq!(claimed, 5);
        assert_eq!(completed, 4);
    }

    #[tokio::test]
    async fn lagging_receiver_loses_oldest_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..3 {
            bus.publish(cancelled(OperationId::new()));
        }

        let lagged = rx.recv().await;
        assert!(matches!(
            lagged,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn receiver_count_reflects_live_subscribers() {
        let bus = EventBus::new(16);
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        drop(rx1);
        assert_eq!(bus.receiver_count(), 1);
    }
}
