//! In-process keyed event bus for the Pulse relay.
//!
//! Topics are plain strings (the log root URI of the stream an event belongs
//! to). Each subscriber owns a bounded channel; a publish delivers the payload
//! to every subscriber of the topic **at most once**. A subscriber whose
//! channel is full misses that payload, and a subscriber whose receiver was
//! dropped is removed on the next publish.
//!
//! This is deliberately not a broker: there is no persistence, replay, or
//! acknowledgement.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default per-subscriber buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Payload delivered to subscribers: the serialized resource content.
pub type Payload = Arc<str>;

type TopicMap = HashMap<String, HashMap<Uuid, mpsc::Sender<Payload>>>;

/// Topic → subscribers registry.
#[derive(Clone)]
pub struct EventBus {
    /// Uses `std::sync::RwLock`: acquisitions never span `.await` points.
    topics: Arc<RwLock<TopicMap>>,
    buffer: usize,
}

/// A live subscription. Receive payloads with [`Subscription::recv`].
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub topic: String,
    receiver: mpsc::Receiver<Payload>,
}

impl Subscription {
    /// Waits for the next payload. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.receiver.recv().await
    }

    /// Returns a payload if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.receiver.try_recv().ok()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    /// Registers a new subscriber for `topic`.
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        let topic = topic.into();
        let id = Uuid::new_v4();
        let (tx, receiver) = mpsc::channel(self.buffer);

        let mut topics = match self.topics.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        topics.entry(topic.clone()).or_default().insert(id, tx);
        tracing::debug!(topic = %topic, subscriber = %id, "subscribed");

        Subscription {
            id,
            topic,
            receiver,
        }
    }

    /// Removes a subscriber. Returns `true` if it was registered.
    pub fn unsubscribe(&self, topic: &str, id: Uuid) -> bool {
        let mut topics = match self.topics.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let removed = subscribers.remove(&id).is_some();
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Delivers `payload` to every subscriber of `topic`.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, topic: &str, payload: impl Into<Payload>) -> usize {
        let payload = payload.into();
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let topics = match self.topics.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let Some(subscribers) = topics.get(topic) else {
                tracing::debug!(topic, "published with no subscribers");
                return 0;
            };

            for (id, tx) in subscribers {
                match tx.try_send(payload.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(topic, subscriber = %id, "subscriber lagging, payload dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        for id in closed {
            self.unsubscribe(topic, id);
        }

        delivered
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .map(|t| t.get(topic).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    /// Topics with at least one subscriber.
    pub fn topics(&self) -> Vec<String> {
        self.topics
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_topic_subscribers_only() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("https://ex/alice/acc-x/");
        let mut b = bus.subscribe("https://ex/alice/acc-x/");
        let mut other = bus.subscribe("https://ex/bob/acc-y/");

        assert_eq!(bus.publish("https://ex/alice/acc-x/", "event"), 2);

        assert_eq!(a.recv().await.as_deref(), Some("event"));
        assert_eq!(b.recv().await.as_deref(), Some("event"));
        assert!(other.try_recv().is_none());
    }

    #[tokio::test]
    async fn delivery_is_at_most_once_per_publish() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("t");
        bus.publish("t", "one");

        assert_eq!(sub.recv().await.as_deref(), Some("one"));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn unsubscribe_removes_subscriber() {
        let bus = EventBus::new();
        let sub = bus.subscribe("t");
        assert_eq!(bus.subscriber_count("t"), 1);

        assert!(bus.unsubscribe("t", sub.id));
        assert!(!bus.unsubscribe("t", sub.id));
        assert_eq!(bus.subscriber_count("t"), 0);
        assert!(bus.topics().is_empty());
        assert_eq!(bus.publish("t", "lost"), 0);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe("t");
        drop(sub);

        assert_eq!(bus.publish("t", "x"), 0);
        assert_eq!(bus.subscriber_count("t"), 0);
    }

    #[test]
    fn full_subscriber_misses_payload() {
        let bus = EventBus::with_buffer(1);
        let mut sub = bus.subscribe("t");

        assert_eq!(bus.publish("t", "first"), 1);
        assert_eq!(bus.publish("t", "second"), 0);
        assert_eq!(sub.try_recv().as_deref(), Some("first"));
        assert!(sub.try_recv().is_none());
    }
}
