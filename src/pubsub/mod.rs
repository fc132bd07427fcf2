//! Publish/Subscribe Relay
//!
//! A channel registry that is fully independent of the keyspace. Each
//! connection that subscribes is identified by an opaque, monotonically
//! assigned [`SubscriberId`] bound to the connection's lifetime, and
//! receives deliveries through its own unbounded mpsc sender (the
//! connection task drains the receiving end between requests).
//!
//! ## Lock discipline
//!
//! The registry sits behind its own `RwLock`, distinct from the keyspace
//! locks. `publish` takes the read lock — sending on an unbounded mpsc
//! channel never blocks — while subscribe/unsubscribe take the write
//! lock. Dead subscribers are not pruned during publish; their
//! registrations are removed when the owning connection drops and calls
//! [`PubSub::unsubscribe_all`].
//!
//! ## Delivery format
//!
//! Every delivery is the three-element array
//! `["message", <channel>, <payload>]`, encoded as bulk strings.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

/// Opaque identity of a subscribing connection.
pub type SubscriberId = u64;

/// Sending half of a connection's delivery mailbox.
pub type DeliverySender = mpsc::UnboundedSender<RespValue>;

/// Receiving half of a connection's delivery mailbox.
pub type DeliveryReceiver = mpsc::UnboundedReceiver<RespValue>;

#[derive(Debug, Default)]
struct Registry {
    /// channel name → subscriber ids
    channels: HashMap<String, HashSet<SubscriberId>>,
    /// subscriber id → delivery mailbox
    senders: HashMap<SubscriberId, DeliverySender>,
    /// subscriber id → channels it is subscribed to (disconnect cleanup)
    subscriptions: HashMap<SubscriberId, HashSet<String>>,
}

/// The shared pub/sub registry.
///
/// Wrapped in an `Arc` and cloned into every connection task alongside
/// the storage engine.
#[derive(Debug, Default)]
pub struct PubSub {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh subscriber identity for a new connection.
    pub fn allocate_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Subscribes `id` to `channel`, installing its mailbox on first
    /// use. Returns the subscriber's total subscription count.
    pub fn subscribe(&self, id: SubscriberId, channel: &str, sender: DeliverySender) -> usize {
        let mut reg = self.registry.write().unwrap();
        reg.senders.entry(id).or_insert(sender);
        reg.channels
            .entry(channel.to_string())
            .or_default()
            .insert(id);
        reg.subscriptions
            .entry(id)
            .or_default()
            .insert(channel.to_string());
        trace!(subscriber = id, channel = channel, "subscribed");
        reg.subscriptions.get(&id).map_or(0, |s| s.len())
    }

    /// Unsubscribes `id` from `channel`. Returns the subscriber's
    /// remaining subscription count; the mailbox is dropped once it
    /// reaches zero.
    pub fn unsubscribe(&self, id: SubscriberId, channel: &str) -> usize {
        let mut reg = self.registry.write().unwrap();
        if let Some(subscribers) = reg.channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                reg.channels.remove(channel);
            }
        }
        if let Some(channels) = reg.subscriptions.get_mut(&id) {
            channels.remove(channel);
        }
        let remaining = reg.subscriptions.get(&id).map_or(0, |s| s.len());
        if remaining == 0 {
            reg.senders.remove(&id);
            reg.subscriptions.remove(&id);
        }
        trace!(subscriber = id, channel = channel, "unsubscribed");
        remaining
    }

    /// Drops every registration held by `id`. Called when the owning
    /// connection closes, which is also where senders broken by earlier
    /// publish failures get cleaned up.
    pub fn unsubscribe_all(&self, id: SubscriberId) {
        let mut reg = self.registry.write().unwrap();
        if let Some(channels) = reg.subscriptions.remove(&id) {
            for channel in channels {
                if let Some(subscribers) = reg.channels.get_mut(&channel) {
                    subscribers.remove(&id);
                    if subscribers.is_empty() {
                        reg.channels.remove(&channel);
                    }
                }
            }
        }
        reg.senders.remove(&id);
    }

    /// The channels `id` is currently subscribed to.
    pub fn subscriptions_of(&self, id: SubscriberId) -> Vec<String> {
        let reg = self.registry.read().unwrap();
        reg.subscriptions
            .get(&id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Fans `message` out to every subscriber of `channel`.
    ///
    /// Delivery is best-effort: a send to a closed mailbox simply does
    /// not count. Returns the number of successful deliveries.
    pub fn publish(&self, channel: &str, message: &Bytes) -> usize {
        let reg = self.registry.read().unwrap();
        let Some(subscribers) = reg.channels.get(channel) else {
            return 0;
        };

        let delivery = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from_static(b"message")),
            RespValue::bulk_string(Bytes::copy_from_slice(channel.as_bytes())),
            RespValue::bulk_string(message.clone()),
        ]);

        let mut delivered = 0;
        for id in subscribers {
            if let Some(sender) = reg.senders.get(id) {
                if sender.send(delivery.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        trace!(channel = channel, delivered = delivered, "published");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(channel: &str, payload: &str) -> RespValue {
        RespValue::array(vec![
            RespValue::bulk_string(Bytes::from_static(b"message")),
            RespValue::bulk_string(Bytes::copy_from_slice(channel.as_bytes())),
            RespValue::bulk_string(Bytes::copy_from_slice(payload.as_bytes())),
        ])
    }

    #[test]
    fn test_publish_without_subscribers() {
        let pubsub = PubSub::new();
        assert_eq!(pubsub.publish("news", &Bytes::from("hello")), 0);
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let pubsub = PubSub::new();
        let id = pubsub.allocate_id();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(pubsub.subscribe(id, "news", tx), 1);
        assert_eq!(pubsub.publish("news", &Bytes::from("hello")), 1);

        assert_eq!(rx.recv().await, Some(delivery("news", "hello")));
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let pubsub = PubSub::new();

        let a = pubsub.allocate_id();
        let b = pubsub.allocate_id();
        assert_ne!(a, b);

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        pubsub.subscribe(a, "news", tx_a);
        pubsub.subscribe(b, "news", tx_b);

        assert_eq!(pubsub.publish("news", &Bytes::from("x")), 2);
        assert_eq!(rx_a.recv().await, Some(delivery("news", "x")));
        assert_eq!(rx_b.recv().await, Some(delivery("news", "x")));
    }

    #[test]
    fn test_publish_is_scoped_to_channel() {
        let pubsub = PubSub::new();
        let id = pubsub.allocate_id();
        let (tx, _rx) = mpsc::unbounded_channel();
        pubsub.subscribe(id, "news", tx);

        assert_eq!(pubsub.publish("sports", &Bytes::from("x")), 0);
    }

    #[test]
    fn test_dead_subscriber_not_counted() {
        let pubsub = PubSub::new();
        let id = pubsub.allocate_id();
        let (tx, rx) = mpsc::unbounded_channel();
        pubsub.subscribe(id, "news", tx);

        drop(rx);
        assert_eq!(pubsub.publish("news", &Bytes::from("x")), 0);
    }

    #[test]
    fn test_subscription_counts() {
        let pubsub = PubSub::new();
        let id = pubsub.allocate_id();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert_eq!(pubsub.subscribe(id, "a", tx.clone()), 1);
        assert_eq!(pubsub.subscribe(id, "b", tx), 2);
        assert_eq!(pubsub.unsubscribe(id, "a"), 1);
        assert_eq!(pubsub.unsubscribe(id, "b"), 0);
        assert!(pubsub.subscriptions_of(id).is_empty());
    }

    #[test]
    fn test_unsubscribe_all_on_disconnect() {
        let pubsub = PubSub::new();

        let gone = pubsub.allocate_id();
        let stays = pubsub.allocate_id();
        let (tx_gone, _rx_gone) = mpsc::unbounded_channel();
        let (tx_stays, _rx_stays) = mpsc::unbounded_channel();
        pubsub.subscribe(gone, "news", tx_gone);
        pubsub.subscribe(stays, "news", tx_stays);

        pubsub.unsubscribe_all(gone);

        assert!(pubsub.subscriptions_of(gone).is_empty());
        assert_eq!(pubsub.publish("news", &Bytes::from("x")), 1);
    }
}
