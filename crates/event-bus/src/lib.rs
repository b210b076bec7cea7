pub mod bus;
pub mod error;
pub mod memory;
pub mod message;

pub use bus::{EventBus, EventBusExt, Subscription};
pub use common::CorrelationId;
pub use error::{EventBusError, Result};
pub use memory::InMemoryEventBus;
pub use message::{Message, MessageBuilder, MessageId};
