//! Shared identifiers used across the order fulfillment workspace.

pub mod types;

pub use types::CorrelationId;
