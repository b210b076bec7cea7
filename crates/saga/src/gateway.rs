//! Intake gateway: starts a saga and waits for its outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::CorrelationId;
use domain::{OrderOutcome, OrderRequest, SagaEvent};
use event_bus::{EventBus, EventBusExt};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::SagaError;
use crate::order_fulfillment::{GROUP_INTAKE, WAIT_ATTEMPTS, WAIT_INTERVAL};
use crate::participant::Participant;

/// How long `submit` waits for a saga to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    max_attempts: u32,
    interval: Duration,
    await_compensation: bool,
}

impl WaitPolicy {
    /// Polls 30 times at one-second intervals and waits for compensation to settle.
    pub const fn new() -> Self {
        Self {
            max_attempts: WAIT_ATTEMPTS,
            interval: WAIT_INTERVAL,
            await_compensation: true,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// When false, the first terminal copy is handed back even if upstream
    /// stages are still compensating.
    #[must_use]
    pub const fn await_compensation(mut self, wait: bool) -> Self {
        self.await_compensation = wait;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on how long `submit` blocks.
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }

    fn is_ready(&self, event: &SagaEvent) -> bool {
        if self.await_compensation {
            event.is_settled()
        } else {
            event.is_terminal()
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// What the caller of `submit` gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderResponse {
    pub correlation_id: CorrelationId,
    pub outcome: OrderOutcome,
    /// The saga log, one line per step.
    pub message: String,
}

impl From<&SagaEvent> for OrderResponse {
    fn from(event: &SagaEvent) -> Self {
        Self {
            correlation_id: event.correlation_id(),
            outcome: event.outcome(),
            message: event.message(),
        }
    }
}

/// Terminal events keyed by correlation ID, for the callers waiting on them.
#[derive(Debug, Clone, Default)]
struct CorrelationTable {
    entries: Arc<Mutex<HashMap<CorrelationId, Option<SagaEvent>>>>,
}

impl CorrelationTable {
    async fn register(&self, correlation_id: CorrelationId) {
        self.entries.lock().await.insert(correlation_id, None);
    }

    async fn forget(&self, correlation_id: CorrelationId) {
        self.entries.lock().await.remove(&correlation_id);
    }

    /// Stores a copy if somebody waits for it and it is the most progressed so far.
    async fn offer(&self, event: SagaEvent) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(slot) = entries.get_mut(&event.correlation_id()) else {
            return false;
        };

        let newer = slot
            .as_ref()
            .is_none_or(|current| event.log().len() >= current.log().len());
        if newer {
            *slot = Some(event);
        }
        newer
    }

    /// Removes and returns the stored copy if `ready` accepts it.
    async fn take_if(
        &self,
        correlation_id: CorrelationId,
        ready: impl Fn(&SagaEvent) -> bool,
    ) -> Option<SagaEvent> {
        let mut entries = self.entries.lock().await;
        let is_ready = matches!(entries.get(&correlation_id), Some(Some(event)) if ready(event));
        if is_ready {
            entries.remove(&correlation_id).flatten()
        } else {
            None
        }
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Participant feeding terminal events into the gateway's correlation table.
pub struct ResultCollector {
    table: CorrelationTable,
}

#[async_trait]
impl Participant for ResultCollector {
    fn name(&self) -> &'static str {
        "intake"
    }

    fn consumer_group(&self) -> &'static str {
        GROUP_INTAKE
    }

    async fn handle(&self, event: SagaEvent) -> Result<Option<SagaEvent>, SagaError> {
        if event.is_terminal() {
            let correlation_id = event.correlation_id();
            if self.table.offer(event).await {
                tracing::debug!(%correlation_id, "terminal event collected");
            }
        }
        Ok(None)
    }
}

/// Entry point of the saga.
///
/// `submit` publishes the initial `REQUESTED` event and blocks the caller
/// until the collector has seen a finished copy or the wait policy gives up.
/// Only the caller's task waits; the participants keep running.
#[derive(Clone)]
pub struct IntakeGateway<B> {
    bus: B,
    topic: String,
    table: CorrelationTable,
    policy: WaitPolicy,
}

impl<B> IntakeGateway<B>
where
    B: EventBus + Clone + 'static,
{
    pub fn new(bus: B, topic: impl Into<String>, policy: WaitPolicy) -> Self {
        Self {
            bus,
            topic: topic.into(),
            table: CorrelationTable::default(),
            policy,
        }
    }

    /// Returns the participant that must be subscribed for `submit` to see results.
    pub fn collector(&self) -> ResultCollector {
        ResultCollector {
            table: self.table.clone(),
        }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Number of callers currently waiting.
    pub async fn pending(&self) -> usize {
        self.table.len().await
    }

    /// Starts a saga for `order` and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::WaitTimeout`] when no finished copy arrived within
    /// the wait ceiling. The saga may still complete in the background.
    #[tracing::instrument(skip(self, order), fields(correlation_id))]
    pub async fn submit(&self, order: OrderRequest) -> Result<OrderResponse, SagaError> {
        let event = SagaEvent::requested(order);
        let correlation_id = event.correlation_id();
        tracing::Span::current().record("correlation_id", tracing::field::display(correlation_id));

        self.table.register(correlation_id).await;
        let published = self
            .bus
            .publish_json(
                &self.topic,
                &correlation_id.to_string(),
                SagaEvent::MESSAGE_TYPE,
                &event,
            )
            .await;
        if let Err(e) = published {
            self.table.forget(correlation_id).await;
            return Err(e.into());
        }

        metrics::counter!("saga_orders_submitted_total").increment(1);
        tracing::info!(
            user_id = %order.user_id(),
            product_id = %order.product_id(),
            quantity = order.quantity(),
            "order requested"
        );

        let started = Instant::now();
        let policy = self.policy;
        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(policy.interval).await;

            if let Some(done) = self
                .table
                .take_if(correlation_id, |e| policy.is_ready(e))
                .await
            {
                metrics::histogram!("saga_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(outcome = %done.outcome(), attempt, "order finished");
                return Ok(OrderResponse::from(&done));
            }
        }

        self.table.forget(correlation_id).await;
        metrics::counter!("saga_wait_timeouts_total").increment(1);
        tracing::error!(attempts = policy.max_attempts, "no result before wait ceiling");
        Err(SagaError::WaitTimeout {
            correlation_id,
            attempts: policy.max_attempts,
        })
    }
}
