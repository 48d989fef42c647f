//! Generic progress/event bus.
//!
//! Both the scan engine and the similarity trainer need to publish
//! progress to whatever is watching (the HTTP shell's SSE endpoint, tests,
//! logs) without caring who's listening or whether anyone is. A
//! `tokio::sync::broadcast` channel wrapped in a small struct gives every
//! subscriber its own receiver and drops events nobody is listening for.

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// A fan-out event bus: many subscribers, lossy if a subscriber falls far
/// enough behind (it will see `RecvError::Lagged` and can choose to resync).
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Returns the number of active subscribers that
    /// received it; `Err` only if there are none, which is not an error
    /// condition for callers that publish unconditionally.
    pub fn publish(&self, event: T) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus: EventBus<u32> = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(42);
        assert_eq!(rx.recv().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus: EventBus<u32> = EventBus::new();
        bus.publish(1);
    }
}
