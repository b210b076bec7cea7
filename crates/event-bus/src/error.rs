use thiserror::Error;

use crate::MessageId;

/// Errors that can occur when interacting with the event bus.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The message asked for was not recorded on the topic.
    #[error("Message {message_id} not found on topic '{topic}'")]
    MessageNotFound { topic: String, message_id: MessageId },

    /// A payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
