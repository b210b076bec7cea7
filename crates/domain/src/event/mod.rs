//! The saga event carried on the bus and its status vocabulary.

mod saga_event;
mod status;

pub use saga_event::SagaEvent;
pub use status::{OrderOutcome, Stage, StageStatus};
