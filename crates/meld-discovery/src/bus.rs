//! # Discovery Bus
//!
//! The broadcast medium discovery nodes gossip over. Frames are JSON text
//! (see [`crate::messages`]); every subscriber sees every frame, its own
//! included, and filters by peer id.
//!
//! [`LocalBus`] is an in-process implementation over
//! `tokio::sync::broadcast`, used when several nodes share a process and in
//! tests. A slow subscriber that falls behind loses the oldest frames.

use tokio::sync::broadcast;

/// Frames buffered per subscriber before the oldest are dropped.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// In-process broadcast channel carrying encoded discovery frames.
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<String>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a frame. Returns the number of subscribers that received it.
    pub fn publish(&self, frame: String) -> usize {
        self.tx.send(frame).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_sees_every_frame() {
        let bus = LocalBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish("one".into()), 2);
        assert_eq!(a.recv().await.unwrap(), "one");
        assert_eq!(b.recv().await.unwrap(), "one");
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let bus = LocalBus::default();
        assert_eq!(bus.publish("lost".into()), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
