//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod users;
