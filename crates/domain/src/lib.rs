//! Domain layer for the order fulfillment saga.
//!
//! This crate holds the data that flows between the saga participants:
//! - [`OrderRequest`] and its value objects ([`UserId`], [`ProductId`], [`Money`])
//! - [`SagaEvent`], the cumulative workflow state carried on the bus, with
//!   the per-participant gating predicates derived from its status vector
//!
//! There is no I/O here. Participants in the `saga` crate read these
//! predicates, perform their local transition and republish the event.

pub mod error;
pub mod event;
pub mod order;

pub use common::CorrelationId;
pub use error::DomainError;
pub use event::{OrderOutcome, SagaEvent, Stage, StageStatus};
pub use order::{Money, OrderError, OrderRequest, ProductId, UserId};
