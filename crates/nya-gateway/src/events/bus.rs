//! Event bus
//!
//! Fan-out of events to any number of subscribers over a broadcast channel.

use tokio::sync::broadcast;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast event bus
///
/// Publishing never blocks. A subscriber that falls more than `capacity` events behind
/// sees `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct EventBus<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a bus with the default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus holding at most `capacity` undelivered events per subscriber
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event
    ///
    /// Returns the number of subscribers that will see it. Having none is not an error.
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus: EventBus<u32> = EventBus::new();
        assert_eq!(bus.publish(1), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish("ready"), 2);
        assert_eq!(first.recv().await.unwrap(), "ready");
        assert_eq!(second.recv().await.unwrap(), "ready");
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = EventBus::new();
        let publisher = bus.clone();
        let mut rx = bus.subscribe();

        publisher.publish(7u64);
        assert_eq!(rx.recv().await.unwrap(), 7);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
