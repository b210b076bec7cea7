//! Bounded retry for compensating transactions.

use std::future::Future;
use std::time::Duration;

use common::CorrelationId;
use domain::Stage;

use crate::error::SagaError;
use crate::order_fulfillment::{MAX_REVERT_ATTEMPTS, REVERT_RETRY_DELAY};

/// How often and how fast a compensating transaction is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the default cap of five attempts.
    pub const fn new() -> Self {
        Self {
            max_attempts: MAX_REVERT_ATTEMPTS,
            delay: REVERT_RETRY_DELAY,
        }
    }

    /// Sets the maximum number of attempts. At least one attempt is always made.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Sets the pause between two attempts.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a compensating transaction until it succeeds or the policy gives up.
///
/// `op` is called once per attempt, so anything it computes (the price to
/// re-credit, for instance) is recomputed each time. Returns the value of the
/// successful attempt together with the number of attempts it took.
///
/// # Errors
///
/// Returns [`SagaError::CompensationExhausted`] once every attempt failed.
pub async fn compensate_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    stage: Stage,
    correlation_id: CorrelationId,
    mut op: F,
) -> Result<(T, u32), SagaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SagaError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        tracing::info!(
            %stage,
            %correlation_id,
            attempt,
            max_attempts = policy.max_attempts,
            "revert transaction in progress"
        );

        match op().await {
            Ok(value) => {
                tracing::info!(%stage, %correlation_id, attempt, "revert transaction finished");
                return Ok((value, attempt));
            }
            Err(e) if attempt >= policy.max_attempts => {
                metrics::counter!("saga_compensation_exhausted_total", "stage" => stage.as_str())
                    .increment(1);
                return Err(SagaError::CompensationExhausted {
                    stage,
                    correlation_id,
                    attempts: attempt,
                    last_error: e.to_string(),
                });
            }
            Err(e) => {
                metrics::counter!("saga_compensation_retries_total", "stage" => stage.as_str())
                    .increment(1);
                tracing::warn!(
                    %stage,
                    %correlation_id,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "revert transaction failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
