//! Vote Payment Service - Main Application Entry Point
//!
//! This is a REST API server for payment-gated vote purchases: it prices
//! vote bundles, applies coupon discounts, opens charges with an external
//! payment gateway, and - on confirmed payment - casts the purchased votes
//! exactly once.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Gateway**: Paystack-style HTTP API with HMAC-signed webhooks
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Wire the gateway client, stores, and reconciliation services
//! 5. Spawn the pending-payment expiry sweep
//! 6. Build HTTP router and start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod state;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::services::catalog::PgCatalog;
use crate::services::fraud::FraudSettings;
use crate::services::gateway::PaystackGateway;
use crate::services::payments::PaymentService;
use crate::services::reconciler::Reconciler;
use crate::services::store::{PaymentStore, PgPaymentStore};
use crate::services::votes::PgVoteCaster;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Wire the collaborators once; handlers receive them through AppState
    let store: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore::new(
        pool.clone(),
        chrono::Duration::minutes(config.pending_payment_ttl_minutes),
    ));
    let catalog = Arc::new(PgCatalog::new(pool.clone()));
    let gateway = Arc::new(PaystackGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_secret_key.clone(),
    )?);
    let vote_caster = Arc::new(PgVoteCaster::new(pool.clone()));

    let payments = Arc::new(PaymentService::new(
        store.clone(),
        catalog,
        gateway.clone(),
        FraudSettings {
            ip_window: chrono::Duration::minutes(config.fraud_ip_window_minutes),
            ip_threshold: config.fraud_ip_threshold,
        },
    ));
    let reconciler = Arc::new(Reconciler::new(store.clone(), gateway, vote_caster));

    // Periodically stamp stale pending payments so they stop matching the
    // duplicate-detection window; rows are never deleted
    let sweep_store = store.clone();
    let sweep_interval =
        std::time::Duration::from_secs(config.expiry_sweep_interval_minutes * 60);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            match sweep_store.sweep_expired().await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "stamped expired pending payments"),
                Err(error) => tracing::warn!(%error, "expiry sweep failed"),
            }
        }
    });

    let app_state = AppState {
        db: pool,
        payments,
        reconciler,
    };

    let app = Router::new()
        // Public liveness probe
        .route("/health", get(handlers::health::health_check))
        // Payment pipeline
        .route(
            "/api/v1/payments/initialize",
            post(handlers::payments::initialize_payment),
        )
        .route(
            "/api/v1/payments/{reference}",
            get(handlers::payments::get_payment),
        )
        // Gateway webhook sink (raw body, HMAC-verified inside)
        .route(
            "/api/v1/webhooks/paystack",
            post(handlers::webhooks::gateway_webhook),
        )
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share collaborators with all handlers via State extraction
        .with_state(app_state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
