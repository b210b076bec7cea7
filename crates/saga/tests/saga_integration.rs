//! End-to-end choreography tests over the in-memory bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Money, OrderOutcome, OrderRequest, ProductId, SagaEvent, Stage, StageStatus, UserId};
use event_bus::InMemoryEventBus;
use saga::order_fulfillment::TOPIC;
use saga::{
    Account, BalanceLedger, InMemoryBalanceLedger, InMemoryCarrier, InMemoryWarehouse,
    IntakeGateway, ParticipantRunner, Product, RetryPolicy, SagaError, SagaRuntime, SagaServices,
    SagaSettings, StockLedger, WaitPolicy,
};
use tokio::sync::mpsc;

const BUYER: u32 = 1;
const RICH_BUYER: u32 = 2;
/// Priced 10.00, ten in stock.
const GADGET: u32 = 10;
/// Priced 500.00, above the buyer's balance.
const LUXURY: u32 = 11;
/// Priced 5.00, none in stock.
const SOLD_OUT: u32 = 12;

/// Balance ledger that rejects the first `n` credits.
struct CreditFaults {
    inner: InMemoryBalanceLedger,
    failures_left: AtomicU32,
    credit_attempts: AtomicU32,
}

#[async_trait]
impl BalanceLedger for CreditFaults {
    async fn get_balance(&self, user_id: UserId) -> Result<Option<Money>, SagaError> {
        self.inner.get_balance(user_id).await
    }

    async fn adjust_balance(&self, user_id: UserId, delta: Money) -> Result<Money, SagaError> {
        if delta > Money::zero() {
            self.credit_attempts.fetch_add(1, Ordering::SeqCst);
            let rejected = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(SagaError::BalanceLedger("credit rejected".to_string()));
            }
        }
        self.inner.adjust_balance(user_id, delta).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, SagaError> {
        self.inner.list_accounts().await
    }
}

struct TestHarness {
    bus: InMemoryEventBus,
    runtime: SagaRuntime<InMemoryEventBus>,
    balances: InMemoryBalanceLedger,
    warehouse: InMemoryWarehouse,
    carrier: InMemoryCarrier,
    credits: Arc<CreditFaults>,
    fatal: mpsc::UnboundedReceiver<SagaError>,
}

impl TestHarness {
    async fn new() -> Self {
        Self::build(0, fast_wait()).await
    }

    async fn build(credit_failures: u32, wait: WaitPolicy) -> Self {
        let bus = InMemoryEventBus::recording();
        let balances = InMemoryBalanceLedger::with_accounts([
            (UserId::new(BUYER), Money::from_dollars(100)),
            (UserId::new(RICH_BUYER), Money::from_dollars(15_000)),
        ]);
        let warehouse = InMemoryWarehouse::with_products([
            Product::new(ProductId::new(GADGET), "gadget", Money::from_dollars(10), 10),
            Product::new(ProductId::new(LUXURY), "yacht", Money::from_dollars(500), 10),
            Product::new(ProductId::new(SOLD_OUT), "sticker", Money::from_dollars(5), 0),
        ]);
        let carrier = InMemoryCarrier::new();
        let credits = Arc::new(CreditFaults {
            inner: balances.clone(),
            failures_left: AtomicU32::new(credit_failures),
            credit_attempts: AtomicU32::new(0),
        });

        let services = SagaServices {
            balances: credits.clone(),
            catalog: Arc::new(warehouse.clone()),
            stock: Arc::new(warehouse.clone()),
            carrier: Arc::new(carrier.clone()),
        };
        let settings = SagaSettings {
            topic: TOPIC.to_string(),
            wait,
            retry: RetryPolicy::new().with_delay(Duration::from_millis(1)),
        };
        let (tx, fatal) = mpsc::unbounded_channel();

        let runtime = SagaRuntime::start(bus.clone(), services, settings, Some(tx))
            .await
            .unwrap();

        Self {
            bus,
            runtime,
            balances,
            warehouse,
            carrier,
            credits,
            fatal,
        }
    }

    async fn submit(&self, user: u32, product: u32, quantity: u32) -> saga::OrderResponse {
        self.runtime
            .gateway()
            .submit(order(user, product, quantity))
            .await
            .unwrap()
    }

    async fn balance(&self, user: u32) -> Money {
        self.balances
            .get_balance(UserId::new(user))
            .await
            .unwrap()
            .unwrap()
    }

    async fn stock(&self, product: u32) -> u32 {
        self.warehouse
            .get_stock(ProductId::new(product))
            .await
            .unwrap()
            .unwrap()
    }

    async fn published_events(&self) -> Vec<SagaEvent> {
        self.bus
            .published(TOPIC)
            .await
            .iter()
            .map(|m| m.decode().unwrap())
            .collect()
    }
}

fn fast_wait() -> WaitPolicy {
    WaitPolicy::new()
        .with_max_attempts(400)
        .with_interval(Duration::from_millis(5))
}

fn order(user: u32, product: u32, quantity: u32) -> OrderRequest {
    OrderRequest::new(UserId::new(user), ProductId::new(product), quantity).unwrap()
}

fn lines(message: &str) -> Vec<&str> {
    message.lines().collect()
}

fn assert_chain_invariants(events: &[SagaEvent]) {
    for event in events {
        if event.shipment_status() == StageStatus::Success {
            assert_eq!(event.inventory_status(), StageStatus::Success);
            assert_eq!(event.balance_status(), StageStatus::Success);
        }
        if event.outcome() == OrderOutcome::Created {
            assert!(event.is_settled());
        }
    }
}

#[tokio::test]
async fn test_happy_path_creates_order() {
    let h = TestHarness::new().await;

    let response = h.submit(BUYER, GADGET, 1).await;

    assert_eq!(response.outcome, OrderOutcome::Created);
    let log = lines(&response.message);
    assert_eq!(log.len(), 3);
    assert_eq!(log[0], "Order was successfully processed for user");
    assert_eq!(log[1], "Warehouse service successfully processed the order");
    assert!(log[2].starts_with("Order was shipped"));

    assert_eq!(h.balance(BUYER).await, Money::from_dollars(90));
    assert_eq!(h.stock(GADGET).await, 9);
    assert_eq!(h.carrier.shipment_count(), 1);

    let events = h.published_events().await;
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.same_saga(&events[0])));
    assert_chain_invariants(&events);
}

#[tokio::test]
async fn test_insufficient_funds_fails_fast() {
    let h = TestHarness::new().await;

    let response = h.submit(BUYER, LUXURY, 1).await;

    assert_eq!(response.outcome, OrderOutcome::Cancelled);
    assert!(
        response
            .message
            .starts_with("Issue occurred during balance decreasing")
    );
    assert_eq!(h.balance(BUYER).await, Money::from_dollars(100));
    assert_eq!(h.stock(LUXURY).await, 10);

    // Nothing was reserved, so nobody compensates.
    let events = h.published_events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].inventory_status(), StageStatus::Unprocessed);
    assert_eq!(h.credits.credit_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_insufficient_stock_restores_balance() {
    let h = TestHarness::new().await;

    let response = h.submit(BUYER, SOLD_OUT, 1).await;

    assert_eq!(response.outcome, OrderOutcome::Cancelled);
    let log = lines(&response.message);
    assert_eq!(log[0], "Order was successfully processed for user");
    assert!(log[1].starts_with("Issue occurred during qty decreasing"));
    assert_eq!(log[2], "Reverting balance decreasing");

    assert_eq!(h.balance(BUYER).await, Money::from_dollars(100));
    assert_eq!(h.stock(SOLD_OUT).await, 0);
    assert_eq!(h.carrier.shipment_count(), 0);
}

#[tokio::test]
async fn test_shipment_failure_compensates_inventory_then_balance() {
    let h = TestHarness::new().await;
    h.carrier.set_fail_on_ship(true);

    let response = h.submit(BUYER, GADGET, 2).await;

    assert_eq!(response.outcome, OrderOutcome::Cancelled);
    let log = lines(&response.message);
    assert_eq!(log.len(), 5);
    assert!(log[2].contains("Shipment provider caused this issue"));
    assert_eq!(log[3], "Reverting QTY decreasing");
    assert_eq!(log[4], "Reverting balance decreasing");

    assert_eq!(h.balance(BUYER).await, Money::from_dollars(100));
    assert_eq!(h.stock(GADGET).await, 10);

    let events = h.published_events().await;
    let inventory_reverted = events
        .iter()
        .position(|e| e.inventory_status() == StageStatus::Revert)
        .unwrap();
    let balance_reverted = events
        .iter()
        .position(|e| e.balance_status() == StageStatus::Revert)
        .unwrap();
    assert!(inventory_reverted < balance_reverted);

    let last = events.last().unwrap();
    assert!(last.is_settled());
    for stage in Stage::ALL {
        assert_eq!(last.status(stage), StageStatus::Revert);
    }
    assert_chain_invariants(&events);
}

#[tokio::test]
async fn test_compensation_retried_until_it_succeeds() {
    let h = TestHarness::build(2, fast_wait()).await;

    let response = h.submit(BUYER, SOLD_OUT, 1).await;

    assert_eq!(response.outcome, OrderOutcome::Cancelled);
    assert_eq!(h.credits.credit_attempts.load(Ordering::SeqCst), 3);
    // Same end state as a first-attempt success, and no double credit.
    assert_eq!(h.balance(BUYER).await, Money::from_dollars(100));
    assert_eq!(
        lines(&response.message).last().copied(),
        Some("Reverting balance decreasing")
    );
}

#[tokio::test]
async fn test_compensation_exhaustion_is_reported_as_fatal() {
    let wait = WaitPolicy::new()
        .with_max_attempts(40)
        .with_interval(Duration::from_millis(5));
    let mut h = TestHarness::build(5, wait).await;

    let err = h
        .runtime
        .gateway()
        .submit(order(BUYER, SOLD_OUT, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::WaitTimeout { .. }));

    let fatal = tokio::time::timeout(Duration::from_secs(2), h.fatal.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        fatal,
        SagaError::CompensationExhausted {
            stage: Stage::Balance,
            attempts: 5,
            ..
        }
    ));

    // The debit is left in place and surfaced, never silently dropped.
    assert_eq!(h.balance(BUYER).await, Money::from_dollars(95));
    assert_eq!(h.credits.credit_attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_first_terminal_copy_when_not_awaiting_compensation() {
    let h = TestHarness::build(0, fast_wait().await_compensation(false)).await;

    let response = h.submit(BUYER, SOLD_OUT, 1).await;

    assert_eq!(response.outcome, OrderOutcome::Cancelled);
    assert!(response.message.contains("Issue occurred during qty decreasing"));
}

#[tokio::test]
async fn test_redelivery_does_not_mutate_ledgers() {
    let h = TestHarness::new().await;
    let response = h.submit(BUYER, GADGET, 1).await;
    assert_eq!(response.outcome, OrderOutcome::Created);

    let published = h.bus.published(TOPIC).await;
    for message in &published {
        h.bus.redeliver(TOPIC, message.message_id).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.bus.message_count(TOPIC).await, published.len());
    assert_eq!(h.balance(BUYER).await, Money::from_dollars(90));
    assert_eq!(h.stock(GADGET).await, 9);
    assert_eq!(h.carrier.shipment_count(), 1);
}

#[tokio::test]
async fn test_redelivered_cancellation_compensates_once() {
    let h = TestHarness::new().await;
    h.carrier.set_fail_on_ship(true);
    h.submit(BUYER, GADGET, 3).await;

    let published = h.bus.published(TOPIC).await;
    for message in &published {
        h.bus.redeliver(TOPIC, message.message_id).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.balance(BUYER).await, Money::from_dollars(100));
    assert_eq!(h.stock(GADGET).await, 10);
    assert_eq!(h.bus.message_count(TOPIC).await, published.len());
}

#[tokio::test]
async fn test_concurrent_orders_are_isolated() {
    let h = TestHarness::new().await;

    let responses = futures_util::future::join_all(
        (0..5).map(|_| h.runtime.gateway().submit(order(RICH_BUYER, GADGET, 1))),
    )
    .await;

    for response in responses {
        assert_eq!(response.unwrap().outcome, OrderOutcome::Created);
    }
    assert_eq!(h.stock(GADGET).await, 5);
    assert_eq!(h.balance(RICH_BUYER).await, Money::from_dollars(14_950));
    assert_eq!(h.carrier.shipment_count(), 5);
}

#[tokio::test]
async fn test_wait_times_out_without_participants() {
    let bus = InMemoryEventBus::new();
    let policy = WaitPolicy::new()
        .with_max_attempts(3)
        .with_interval(Duration::from_millis(5));
    let gateway = IntakeGateway::new(bus.clone(), TOPIC, policy);
    ParticipantRunner::new(bus.clone(), TOPIC, Arc::new(gateway.collector()))
        .spawn()
        .await
        .unwrap();

    let err = gateway.submit(order(BUYER, GADGET, 1)).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, SagaError::WaitTimeout { attempts: 3, .. }));
    assert_eq!(gateway.pending().await, 0);
}

#[tokio::test]
async fn test_shutdown_stops_participants() {
    let TestHarness {
        bus,
        runtime,
        balances,
        ..
    } = TestHarness::new().await;
    let policy = runtime.gateway().policy().with_max_attempts(3);
    runtime.shutdown();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let gateway = IntakeGateway::new(bus.clone(), TOPIC, policy);
    let err = gateway.submit(order(BUYER, GADGET, 1)).await.unwrap_err();

    assert!(matches!(err, SagaError::WaitTimeout { .. }));
    let balance = balances.get_balance(UserId::new(BUYER)).await.unwrap();
    assert_eq!(balance, Some(Money::from_dollars(100)));
}
