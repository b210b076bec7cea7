//! Wiring of the gateway and the participants onto one bus.

use std::sync::Arc;

use event_bus::EventBus;
use tokio::task::JoinHandle;

use crate::error::SagaError;
use crate::gateway::{IntakeGateway, WaitPolicy};
use crate::order_fulfillment::TOPIC;
use crate::participant::{FatalSink, Participant, ParticipantRunner};
use crate::participants::{BalanceParticipant, InventoryParticipant, ShipmentParticipant};
use crate::retry::RetryPolicy;
use crate::services::{BalanceLedger, Carrier, Catalog, StockLedger};

/// External collaborators the participants act on.
#[derive(Clone)]
pub struct SagaServices {
    pub balances: Arc<dyn BalanceLedger>,
    pub catalog: Arc<dyn Catalog>,
    pub stock: Arc<dyn StockLedger>,
    pub carrier: Arc<dyn Carrier>,
}

/// Tunables of a running saga.
#[derive(Debug, Clone)]
pub struct SagaSettings {
    pub topic: String,
    pub wait: WaitPolicy,
    pub retry: RetryPolicy,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            topic: TOPIC.to_string(),
            wait: WaitPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// The gateway plus one running consumer per participant.
pub struct SagaRuntime<B> {
    gateway: IntakeGateway<B>,
    handles: Vec<JoinHandle<()>>,
}

impl<B> SagaRuntime<B>
where
    B: EventBus + Clone + 'static,
{
    /// Subscribes the result collector and the three participants, then returns.
    ///
    /// Every subscription exists before this returns, so the first order
    /// submitted through [`SagaRuntime::gateway`] is seen by all of them.
    pub async fn start(
        bus: B,
        services: SagaServices,
        settings: SagaSettings,
        fatal: Option<FatalSink>,
    ) -> Result<Self, SagaError> {
        let gateway = IntakeGateway::new(bus.clone(), settings.topic.clone(), settings.wait);

        let participants: Vec<Arc<dyn Participant>> = vec![
            Arc::new(gateway.collector()),
            Arc::new(
                BalanceParticipant::new(services.balances, services.catalog)
                    .with_retry_policy(settings.retry),
            ),
            Arc::new(InventoryParticipant::new(services.stock).with_retry_policy(settings.retry)),
            Arc::new(ShipmentParticipant::new(services.carrier)),
        ];

        let mut handles = Vec::with_capacity(participants.len());
        for participant in participants {
            let handle = ParticipantRunner::new(bus.clone(), settings.topic.clone(), participant)
                .with_fatal_sink(fatal.clone())
                .spawn()
                .await;
            match handle {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    handles.iter().for_each(JoinHandle::abort);
                    return Err(e);
                }
            }
        }

        tracing::info!(topic = %settings.topic, "saga runtime started");
        Ok(Self { gateway, handles })
    }

    pub fn gateway(&self) -> &IntakeGateway<B> {
        &self.gateway
    }

    /// Stops every participant. Handlers still in flight are cancelled.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        tracing::info!("saga runtime stopped");
    }
}
