use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::{RwLock, mpsc};

use crate::{
    EventBusError, Message, MessageId, Result,
    bus::{EventBus, Subscription},
};

struct Topic {
    subscribers: Vec<mpsc::UnboundedSender<Message>>,
    log: Option<Vec<Message>>,
}

impl Topic {
    fn new(recording: bool) -> Self {
        Self {
            subscribers: Vec::new(),
            log: recording.then(Vec::new),
        }
    }

    /// Hands a message to every live subscriber, dropping the closed ones.
    fn deliver(&mut self, message: &Message) -> usize {
        self.subscribers
            .retain(|subscriber| subscriber.send(message.clone()).is_ok());
        self.subscribers.len()
    }
}

/// In-memory event bus with one unbounded queue per subscription.
///
/// Every subscription sees every message published after it subscribed, in
/// publication order. A slow subscriber never loses messages; its queue grows
/// until it catches up.
///
/// A bus built with [`InMemoryEventBus::recording`] also keeps an append-only
/// publication log per topic, so tests can inspect what was published and
/// replay messages to simulate at-least-once redelivery. The default bus keeps
/// nothing once a message has been handed to its subscribers.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    topics: Arc<RwLock<HashMap<String, Topic>>>,
    recording: bool,
}

impl InMemoryEventBus {
    /// Creates a new empty in-memory bus that retains no messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that keeps every published message for inspection and redelivery.
    pub fn recording() -> Self {
        Self {
            topics: Arc::default(),
            recording: true,
        }
    }

    /// Returns every message published on a topic, oldest first.
    ///
    /// Always empty unless the bus is recording.
    pub async fn published(&self, topic: &str) -> Vec<Message> {
        self.topics
            .read()
            .await
            .get(topic)
            .and_then(|t| t.log.clone())
            .unwrap_or_default()
    }

    /// Returns the number of recorded messages on a topic.
    pub async fn message_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .and_then(|t| t.log.as_ref())
            .map_or(0, Vec::len)
    }

    /// Delivers an already published message to every current subscriber again.
    ///
    /// Only recorded messages can be redelivered. The publication log is left
    /// untouched: a redelivery is a second delivery of the same publication,
    /// not a new one.
    pub async fn redeliver(&self, topic: &str, message_id: MessageId) -> Result<()> {
        let not_found = || EventBusError::MessageNotFound {
            topic: topic.to_string(),
            message_id,
        };

        let mut topics = self.topics.write().await;
        let t = topics.get_mut(topic).ok_or_else(not_found)?;
        let message = t
            .log
            .as_ref()
            .and_then(|log| log.iter().find(|m| m.message_id == message_id))
            .cloned()
            .ok_or_else(not_found)?;

        tracing::debug!(%topic, %message_id, "redelivering message");
        if t.deliver(&message) == 0 {
            tracing::debug!(%topic, "no subscribers for redelivery");
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, message: Message) -> Result<()> {
        let mut topics = self.topics.write().await;
        let topic = topics
            .entry(message.topic.clone())
            .or_insert_with(|| Topic::new(self.recording));

        if let Some(log) = topic.log.as_mut() {
            log.push(message.clone());
        }
        metrics::counter!("bus_messages_published_total").increment(1);

        if topic.deliver(&message) == 0 {
            tracing::debug!("message published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(self.recording))
            .subscribers
            .push(sender);

        tracing::info!(%topic, %group, "consumer group subscribed");

        let stream = stream::unfold(receiver, |mut receiver| async move {
            let message = receiver.recv().await?;
            Some((Ok(message), receiver))
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBusExt;
    use futures_util::StreamExt;

    fn message(topic: &str, key: &str, seq: u32) -> Message {
        Message::builder(topic, key)
            .message_type("Test")
            .payload_raw(serde_json::json!({ "seq": seq }))
            .build()
    }

    #[tokio::test]
    async fn every_group_receives_every_message_in_order() {
        let bus = InMemoryEventBus::new();
        let mut balance = bus.subscribe("orders", "balance").await.unwrap();
        let mut inventory = bus.subscribe("orders", "inventory").await.unwrap();

        for seq in 1..=3 {
            bus.publish(message("orders", "k", seq)).await.unwrap();
        }

        for sub in [&mut balance, &mut inventory] {
            for seq in 1..=3 {
                let received = sub.next().await.unwrap().unwrap();
                assert_eq!(received.payload["seq"], seq);
            }
        }
    }

    #[tokio::test]
    async fn subscription_only_sees_later_messages() {
        let bus = InMemoryEventBus::new();
        bus.publish(message("orders", "k", 1)).await.unwrap();

        let mut sub = bus.subscribe("orders", "late").await.unwrap();
        bus.publish(message("orders", "k", 2)).await.unwrap();

        let received = sub.next().await.unwrap().unwrap();
        assert_eq!(received.payload["seq"], 2);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = InMemoryEventBus::recording();
        let mut sub = bus.subscribe("orders", "g").await.unwrap();

        bus.publish(message("other", "k", 1)).await.unwrap();
        bus.publish(message("orders", "k", 2)).await.unwrap();

        let received = sub.next().await.unwrap().unwrap();
        assert_eq!(received.topic, "orders");
        assert_eq!(bus.message_count("other").await, 1);
        assert_eq!(bus.message_count("orders").await, 1);
    }

    #[tokio::test]
    async fn published_log_is_append_only() {
        let bus = InMemoryEventBus::recording();
        bus.publish_json("orders", "a", "Test", &serde_json::json!({"n": 1}))
            .await
            .unwrap();
        bus.publish_json("orders", "b", "Test", &serde_json::json!({"n": 2}))
            .await
            .unwrap();

        let log = bus.published("orders").await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].key, "a");
        assert_eq!(log[1].key, "b");
        assert!(bus.published("missing").await.is_empty());
    }

    #[tokio::test]
    async fn default_bus_retains_nothing() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe("orders", "g").await.unwrap();

        let mut last = None;
        for seq in 1..=10_000 {
            let m = message("orders", "k", seq);
            last = Some(m.message_id);
            bus.publish(m).await.unwrap();
        }

        assert_eq!(bus.message_count("orders").await, 0);
        assert!(bus.published("orders").await.is_empty());
        assert!(matches!(
            bus.redeliver("orders", last.unwrap()).await,
            Err(EventBusError::MessageNotFound { .. })
        ));

        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.payload["seq"], 1);
    }

    #[tokio::test]
    async fn redeliver_replays_same_message_id() {
        let bus = InMemoryEventBus::recording();
        let mut sub = bus.subscribe("orders", "g").await.unwrap();

        let original = message("orders", "k", 1);
        let id = original.message_id;
        bus.publish(original).await.unwrap();
        bus.redeliver("orders", id).await.unwrap();

        let first = sub.next().await.unwrap().unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(first.message_id, id);
        assert_eq!(second.message_id, id);
        assert_eq!(bus.message_count("orders").await, 1);
    }

    #[tokio::test]
    async fn redeliver_unknown_message_fails() {
        let bus = InMemoryEventBus::recording();
        let result = bus.redeliver("orders", MessageId::new()).await;
        assert!(matches!(
            result,
            Err(EventBusError::MessageNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn slow_subscriber_misses_nothing() {
        let bus = InMemoryEventBus::new();
        let mut slow = bus.subscribe("orders", "slow").await.unwrap();

        for seq in 1..=5_000 {
            bus.publish(message("orders", "k", seq)).await.unwrap();
        }

        for seq in 1..=5_000 {
            let received = slow.next().await.unwrap().unwrap();
            assert_eq!(received.payload["seq"], seq);
        }
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let bus = InMemoryEventBus::new();
        let gone = bus.subscribe("orders", "gone").await.unwrap();
        let mut kept = bus.subscribe("orders", "kept").await.unwrap();
        drop(gone);

        bus.publish(message("orders", "k", 1)).await.unwrap();

        assert_eq!(bus.topics.read().await["orders"].subscribers.len(), 1);
        let received = kept.next().await.unwrap().unwrap();
        assert_eq!(received.payload["seq"], 1);
    }
}
