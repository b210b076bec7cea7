//! HTTP boundary of the order fulfillment saga.
//!
//! Accepts orders, blocks until the choreography settles them, and exposes
//! the user and catalog listings, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_bus::InMemoryEventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    BalanceLedger, Catalog, FatalSink, FlakyCarrier, InMemoryBalanceLedger, InMemoryWarehouse,
    IntakeGateway, PostgresLedger, SagaError, SagaRuntime, SagaServices, SagaSettings,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub gateway: IntakeGateway<InMemoryEventBus>,
    pub balances: Arc<dyn BalanceLedger>,
    pub catalog: Arc<dyn Catalog>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::submit))
        .route("/users", get(routes::users::list))
        .route(
            "/warehouse/products/available",
            get(routes::products::available),
        )
        .route("/warehouse/products/{id}", get(routes::products::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Starts the saga over a fresh in-memory bus and builds the state serving it.
///
/// The returned runtime owns the participant tasks; shut it down after the
/// server stops.
pub async fn create_state(
    services: SagaServices,
    settings: SagaSettings,
    fatal: Option<FatalSink>,
) -> Result<(Arc<AppState>, SagaRuntime<InMemoryEventBus>), SagaError> {
    let balances = services.balances.clone();
    let catalog = services.catalog.clone();
    let runtime = SagaRuntime::start(InMemoryEventBus::new(), services, settings, fatal).await?;

    let state = Arc::new(AppState {
        gateway: runtime.gateway().clone(),
        balances,
        catalog,
    });
    Ok((state, runtime))
}

/// Creates the application state from configuration.
///
/// Uses PostgreSQL ledgers when `DATABASE_URL` is set (migrating and seeding
/// the demo accounts and products if missing), seeded in-memory ledgers
/// otherwise. Shipments go through a carrier that rejects
/// `carrier_failure_rate` of them.
pub async fn create_default_state(
    config: &Config,
    fatal: Option<FatalSink>,
) -> Result<(Arc<AppState>, SagaRuntime<InMemoryEventBus>), ApiError> {
    let carrier = Arc::new(FlakyCarrier::new(config.carrier_failure_rate));
    let balances = InMemoryBalanceLedger::seeded();
    let warehouse = InMemoryWarehouse::seeded();

    let services = match &config.database_url {
        Some(url) => {
            let ledger = PostgresLedger::connect(url).await?;
            ledger
                .run_migrations()
                .await
                .map_err(|e| ApiError::Internal(format!("migration failed: {e}")))?;
            ledger.seed_accounts(&balances.list_accounts().await?).await?;
            ledger.seed_products(&warehouse.list_products().await?).await?;
            tracing::info!("using PostgreSQL ledgers");

            let ledger = Arc::new(ledger);
            SagaServices {
                balances: ledger.clone(),
                catalog: ledger.clone(),
                stock: ledger,
                carrier,
            }
        }
        None => {
            tracing::info!("using in-memory ledgers");
            SagaServices {
                balances: Arc::new(balances),
                catalog: Arc::new(warehouse.clone()),
                stock: Arc::new(warehouse),
                carrier,
            }
        }
    };

    create_state(services, config.saga_settings(), fatal)
        .await
        .map_err(ApiError::from)
}
