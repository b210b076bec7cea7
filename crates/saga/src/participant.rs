//! Participant trait and the consumer loop that drives it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use common::CorrelationId;
use domain::SagaEvent;
use event_bus::{EventBus, EventBusExt, Message, Subscription};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

use crate::error::SagaError;

/// Receives fatal errors raised by participant handlers.
pub type FatalSink = mpsc::UnboundedSender<SagaError>;

/// A saga participant reacting to every event on the topic.
///
/// `handle` inspects the status vector, performs at most one local
/// transition, and returns the updated event to republish. `Ok(None)` means
/// the event was not this participant's to act on.
#[async_trait]
pub trait Participant: Send + Sync + 'static {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Consumer group this participant subscribes under.
    fn consumer_group(&self) -> &'static str;

    async fn handle(&self, event: SagaEvent) -> Result<Option<SagaEvent>, SagaError>;
}

/// Subscribes a participant to the topic and runs its handler for every event.
///
/// Events for different correlation IDs are handled concurrently. Events for
/// the same correlation ID are handled one at a time in delivery order.
#[derive(Clone)]
pub struct ParticipantRunner<B> {
    bus: B,
    topic: String,
    participant: Arc<dyn Participant>,
    fatal: Option<FatalSink>,
}

impl<B> ParticipantRunner<B>
where
    B: EventBus + Clone + 'static,
{
    pub fn new(bus: B, topic: impl Into<String>, participant: Arc<dyn Participant>) -> Self {
        Self {
            bus,
            topic: topic.into(),
            participant,
            fatal: None,
        }
    }

    /// Forwards fatal handler errors to `sink` in addition to logging them.
    #[must_use]
    pub fn with_fatal_sink(mut self, sink: Option<FatalSink>) -> Self {
        self.fatal = sink;
        self
    }

    /// Subscribes, then runs the consumer loop on a background task.
    ///
    /// The subscription is in place when this returns, so nothing published
    /// afterwards is missed.
    pub async fn spawn(self) -> Result<JoinHandle<()>, SagaError> {
        let subscription = self
            .bus
            .subscribe(&self.topic, self.participant.consumer_group())
            .await?;

        tracing::info!(
            participant = self.participant.name(),
            topic = %self.topic,
            "participant started"
        );
        Ok(tokio::spawn(self.run(subscription)))
    }

    async fn run(self, mut subscription: Subscription) {
        let name = self.participant.name();
        let mut tasks = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, CorrelationId> = HashMap::new();
        // Correlation IDs with a handler in flight, and the events queued behind it.
        let mut backlog: HashMap<CorrelationId, VecDeque<SagaEvent>> = HashMap::new();

        loop {
            tokio::select! {
                next = subscription.next() => {
                    let message = match next {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            tracing::warn!(participant = name, error = %e, "subscription error");
                            continue;
                        }
                        None => break,
                    };
                    let Some(event) = decode(name, &message) else {
                        continue;
                    };

                    let correlation_id = event.correlation_id();
                    if let Some(queue) = backlog.get_mut(&correlation_id) {
                        queue.push_back(event);
                    } else {
                        backlog.insert(correlation_id, VecDeque::new());
                        self.spawn_handler(&mut tasks, &mut running, event);
                    }
                }
                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    let task_id = match joined {
                        Ok((task_id, ())) => task_id,
                        Err(e) => {
                            tracing::error!(participant = name, error = %e, "handler task failed");
                            e.id()
                        }
                    };
                    let Some(correlation_id) = running.remove(&task_id) else {
                        continue;
                    };

                    let next = backlog.get_mut(&correlation_id).and_then(VecDeque::pop_front);
                    match next {
                        Some(event) => self.spawn_handler(&mut tasks, &mut running, event),
                        None => {
                            backlog.remove(&correlation_id);
                        }
                    }
                }
            }
        }

        tracing::info!(participant = name, "subscription closed, draining handlers");
        while tasks.join_next().await.is_some() {}
    }

    fn spawn_handler(
        &self,
        tasks: &mut JoinSet<()>,
        running: &mut HashMap<tokio::task::Id, CorrelationId>,
        event: SagaEvent,
    ) {
        let correlation_id = event.correlation_id();
        let span = tracing::info_span!(
            "handle",
            participant = self.participant.name(),
            %correlation_id
        );
        let handle = tasks.spawn(self.clone().process(event).instrument(span));
        running.insert(handle.id(), correlation_id);
    }

    async fn process(self, event: SagaEvent) {
        let name = self.participant.name();
        let correlation_id = event.correlation_id();
        metrics::counter!("saga_events_received_total", "participant" => name).increment(1);

        match self.participant.handle(event).await {
            Ok(Some(next)) => {
                let key = correlation_id.to_string();
                match self
                    .bus
                    .publish_json(&self.topic, &key, SagaEvent::MESSAGE_TYPE, &next)
                    .await
                {
                    Ok(()) => {
                        metrics::counter!("saga_events_published_total", "participant" => name)
                            .increment(1);
                        tracing::debug!(
                            outcome = %next.outcome(),
                            balance = %next.balance_status(),
                            inventory = %next.inventory_status(),
                            shipment = %next.shipment_status(),
                            "event republished"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to republish event");
                    }
                }
            }
            Ok(None) => {
                tracing::trace!("event ignored");
            }
            Err(e) if e.is_fatal() => {
                metrics::counter!("saga_fatal_errors_total", "participant" => name).increment(1);
                tracing::error!(error = %e, "fatal saga error");
                if let Some(sink) = &self.fatal {
                    let _ = sink.send(e);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "handler failed");
            }
        }
    }
}

fn decode(participant: &str, message: &Message) -> Option<SagaEvent> {
    if message.message_type != SagaEvent::MESSAGE_TYPE {
        tracing::debug!(
            participant,
            message_type = %message.message_type,
            "skipping message of unknown type"
        );
        return None;
    }

    match message.decode::<SagaEvent>() {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(
                participant,
                message_id = %message.message_id,
                error = %e,
                "skipping undecodable message"
            );
            None
        }
    }
}
