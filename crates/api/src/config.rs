//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::order_fulfillment::{
    MAX_REVERT_ATTEMPTS, REVERT_RETRY_DELAY, TOPIC, WAIT_ATTEMPTS, WAIT_INTERVAL,
};
use saga::{RetryPolicy, SagaSettings, WaitPolicy};

/// Server and saga configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `ORDER_TOPIC`: saga topic (default: `"order-processing"`)
/// - `ORDER_WAIT_ATTEMPTS` / `ORDER_WAIT_INTERVAL_MS`: how long a submission
///   waits for its result (default: 30 polls, 1000 ms apart)
/// - `COMPENSATION_MAX_ATTEMPTS` / `COMPENSATION_RETRY_DELAY_MS`: compensation
///   retry cap (default: 5 attempts, 100 ms apart)
/// - `CARRIER_FAILURE_RATE`: chance the simulated carrier rejects a shipment
///   (default: `0.5`)
/// - `DATABASE_URL`: PostgreSQL ledgers when set, in-memory otherwise
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub topic: String,
    pub wait_attempts: u32,
    pub wait_interval: Duration,
    pub compensation_max_attempts: u32,
    pub compensation_retry_delay: Duration,
    pub carrier_failure_rate: f64,
    pub database_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            topic: lookup("ORDER_TOPIC")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.topic),
            wait_attempts: parse_or(&lookup, "ORDER_WAIT_ATTEMPTS", defaults.wait_attempts),
            wait_interval: parsed("ORDER_WAIT_INTERVAL_MS")
                .map_or(defaults.wait_interval, Duration::from_millis),
            compensation_max_attempts: parse_or(
                &lookup,
                "COMPENSATION_MAX_ATTEMPTS",
                defaults.compensation_max_attempts,
            ),
            compensation_retry_delay: parsed("COMPENSATION_RETRY_DELAY_MS")
                .map_or(defaults.compensation_retry_delay, Duration::from_millis),
            carrier_failure_rate: parse_or(
                &lookup,
                "CARRIER_FAILURE_RATE",
                defaults.carrier_failure_rate,
            ),
            database_url: lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new()
            .with_max_attempts(self.wait_attempts)
            .with_interval(self.wait_interval)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.compensation_max_attempts)
            .with_delay(self.compensation_retry_delay)
    }

    pub fn saga_settings(&self) -> SagaSettings {
        SagaSettings {
            topic: self.topic.clone(),
            wait: self.wait_policy(),
            retry: self.retry_policy(),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            topic: TOPIC.to_string(),
            wait_attempts: WAIT_ATTEMPTS,
            wait_interval: WAIT_INTERVAL,
            compensation_max_attempts: MAX_REVERT_ATTEMPTS,
            compensation_retry_delay: REVERT_RETRY_DELAY,
            carrier_failure_rate: 0.5,
            database_url: None,
        }
    }
}
