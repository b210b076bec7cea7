use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::{Message, Result};

/// A stream of messages delivered to one consumer group.
pub type Subscription = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

/// Core trait for event bus implementations.
///
/// A bus is an ordered, at-least-once publish/subscribe stream keyed by topic.
/// Every consumer group subscribed to a topic receives its own copy of every
/// message published after the subscription was made, in publication order.
/// Consumers must tolerate receiving the same message more than once.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a message on its topic.
    async fn publish(&self, message: Message) -> Result<()>;

    /// Subscribes a consumer group to a topic.
    ///
    /// Only messages published after this call returns are delivered.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription>;
}

/// Extension trait providing convenience methods for event buses.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Serializes a payload and publishes it on a topic under the given key.
    async fn publish_json<T>(
        &self,
        topic: &str,
        key: &str,
        message_type: &str,
        payload: &T,
    ) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let message = Message::builder(topic, key)
            .message_type(message_type)
            .payload(payload)?
            .build();
        self.publish(message).await
    }
}

// Blanket implementation for all EventBus implementations
impl<T: EventBus + ?Sized> EventBusExt for T {}
