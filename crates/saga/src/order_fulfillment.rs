//! Order fulfillment saga constants.

use std::time::Duration;

/// The single topic every participant reads from and publishes to.
pub const TOPIC: &str = "order-processing";

/// Consumer group of the intake gateway's result collector.
pub const GROUP_INTAKE: &str = "order-intake";

/// Consumer group of the balance participant.
pub const GROUP_BALANCE: &str = "balance";

/// Consumer group of the inventory participant.
pub const GROUP_INVENTORY: &str = "inventory";

/// Consumer group of the shipment participant.
pub const GROUP_SHIPMENT: &str = "shipment";

/// Attempts a compensating transaction gets before it is reported as fatal.
pub const MAX_REVERT_ATTEMPTS: u32 = 5;

/// Pause between compensation attempts.
pub const REVERT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Times the gateway polls for a terminal event before giving up.
pub const WAIT_ATTEMPTS: u32 = 30;

/// Pause between two polls of the gateway.
pub const WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// How long a participant remembers a step it already ran.
///
/// A redelivered copy older than this is gated on its status vector alone, so
/// it must outlast any redelivery the bus can still make.
pub const HANDLED_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
