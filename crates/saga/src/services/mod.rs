//! External collaborators of the saga participants.
//!
//! Each participant talks to its collaborators only through these traits, so
//! the saga logic does not depend on where balances or stock live.

pub mod balance;
pub mod carrier;
pub mod postgres;
pub mod warehouse;

pub use balance::{Account, BalanceLedger, InMemoryBalanceLedger};
pub use carrier::{Carrier, FlakyCarrier, InMemoryCarrier, ShipmentReceipt};
pub use postgres::PostgresLedger;
pub use warehouse::{Catalog, InMemoryWarehouse, Product, StockLedger};
