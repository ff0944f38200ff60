use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use wishlist_sdk::objects::WishlistEvent;

/// Live fan-out of committed events, one broadcast channel per share slug.
///
/// Channels are created by the first subscriber and dropped once the last
/// one leaves. Publishing to a slug nobody watches is a no-op; the event is
/// already in the log and will be replayed on connect.
#[derive(Debug)]
pub struct RealtimeHub {
    channels: RwLock<HashMap<String, broadcast::Sender<WishlistEvent>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Receiver for events published to `slug` from now on. After
    /// [`close_all`](Self::close_all) the receiver is already closed.
    pub async fn subscribe(&self, slug: &str) -> broadcast::Receiver<WishlistEvent> {
        if self.closed.load(Ordering::Acquire) {
            let (_, rx) = broadcast::channel(1);
            return rx;
        }
        if let Some(tx) = self.channels.read().await.get(slug) {
            return tx.subscribe();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(slug.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn publish(&self, slug: &str, events: &[WishlistEvent]) {
        if events.is_empty() {
            return;
        }
        let mut channels = self.channels.write().await;
        let Some(tx) = channels.get(slug).cloned() else {
            return;
        };
        for event in events {
            if tx.send(event.clone()).is_err() {
                debug!(slug, "no live subscribers left, dropping channel");
                channels.remove(slug);
                return;
            }
        }
    }

    /// Drop the channel of `slug` if nobody listens anymore.
    pub async fn release(&self, slug: &str) {
        let mut channels = self.channels.write().await;
        if channels
            .get(slug)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(slug);
        }
    }

    /// Close every channel; receivers observe `RecvError::Closed`.
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        let dropped = std::mem::take(&mut *self.channels.write().await);
        debug!(channels = dropped.len(), "realtime hub closed");
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;
    use tokio::sync::broadcast::error::RecvError;
    use wishlist_sdk::objects::EventType;

    fn event(id: i64) -> WishlistEvent {
        WishlistEvent {
            id,
            event_type: EventType::WishlistClosed,
            item_id: None,
            payload: json!({}),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_of_slug() {
        let hub = RealtimeHub::new(16);
        let mut a = hub.subscribe("party-abc123").await;
        let mut b = hub.subscribe("party-abc123").await;
        let mut other = hub.subscribe("other-xyz789").await;

        hub.publish("party-abc123", &[event(1), event(2)]).await;

        assert_eq!(a.recv().await.unwrap().id, 1);
        assert_eq!(a.recv().await.unwrap().id, 2);
        assert_eq!(b.recv().await.unwrap().id, 1);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_dropped_after_last_subscriber() {
        let hub = RealtimeHub::new(16);
        let rx = hub.subscribe("party-abc123").await;
        assert_eq!(hub.channel_count().await, 1);
        drop(rx);
        hub.release("party-abc123").await;
        assert_eq!(hub.channel_count().await, 0);

        // Nobody listening: nothing to deliver to, nothing created.
        hub.publish("party-abc123", &[event(1)]).await;
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_all_closes_receivers() {
        let hub = RealtimeHub::new(16);
        let mut rx = hub.subscribe("party-abc123").await;
        hub.close_all().await;
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));

        let mut late = hub.subscribe("party-abc123").await;
        assert!(matches!(late.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn test_slow_receiver_lags() {
        let hub = RealtimeHub::new(2);
        let mut rx = hub.subscribe("party-abc123").await;
        hub.publish("party-abc123", &[event(1), event(2), event(3)])
            .await;
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().id, 2);
    }
}
