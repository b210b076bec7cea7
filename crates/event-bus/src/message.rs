use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single publication on the bus.
///
/// Redelivering a message keeps its ID; republishing a new version of the
/// same saga gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message travelling on a topic, wrapping a JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier of this publication.
    pub message_id: MessageId,

    /// The topic the message is published on.
    pub topic: String,

    /// Partitioning key. Saga messages use the correlation ID.
    pub key: String,

    /// Name of the payload type (e.g., "SagaEvent").
    pub message_type: String,

    /// When the message was published.
    pub published_at: DateTime<Utc>,

    /// The message payload as JSON.
    pub payload: serde_json::Value,
}

impl Message {
    /// Creates a new message builder for the given topic and key.
    pub fn builder(topic: impl Into<String>, key: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            topic: topic.into(),
            key: key.into(),
            message_type: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    /// Deserializes the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Builder for constructing messages.
#[derive(Debug)]
pub struct MessageBuilder {
    topic: String,
    key: String,
    message_type: String,
    payload: serde_json::Value,
}

impl MessageBuilder {
    /// Sets the message type.
    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Builds the message, stamping a fresh ID and the current time.
    pub fn build(self) -> Message {
        Message {
            message_id: MessageId::new(),
            topic: self.topic,
            key: self.key,
            message_type: self.message_type,
            published_at: Utc::now(),
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn message_id_new_creates_unique_ids() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn builder_sets_routing_fields() {
        let message = Message::builder("order-processing", "abc")
            .message_type("Ping")
            .payload_raw(serde_json::json!({"seq": 1}))
            .build();

        assert_eq!(message.topic, "order-processing");
        assert_eq!(message.key, "abc");
        assert_eq!(message.message_type, "Ping");
    }

    #[test]
    fn decode_returns_typed_payload() {
        let message = Message::builder("t", "k")
            .payload(&Ping { seq: 7 })
            .unwrap()
            .build();

        assert_eq!(message.decode::<Ping>().unwrap(), Ping { seq: 7 });
    }

    #[test]
    fn decode_fails_on_mismatched_payload() {
        let message = Message::builder("t", "k")
            .payload_raw(serde_json::json!({"unexpected": true}))
            .build();

        assert!(message.decode::<Ping>().is_err());
    }

    #[test]
    fn payload_defaults_to_null() {
        let message = Message::builder("t", "k").build();
        assert!(message.payload.is_null());
    }
}
