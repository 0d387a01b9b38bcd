//! sync-gateway server entry point.
//!
//! Starts the Axum HTTP server, running pending migrations first.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sync_gateway::api;
use sync_gateway::app_state::AppState;
use sync_gateway::config::GatewayConfig;
use sync_gateway::domain::{BreakerPolicy, CredentialCipher, EventBus};
use sync_gateway::persistence::PostgresPersistence;
use sync_gateway::service::{
    DeviceService, HttpOperationDispatcher, LoggingPushTransport, NotificationService,
    QueuePolicy, QueueService, ResilienceService, SyncService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting sync-gateway");

    // Connect to PostgreSQL and run pending migrations
    let persistence = Arc::new(PostgresPersistence::connect(&config).await?);
    tracing::info!("database ready");

    // Build domain layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let cipher = Arc::new(CredentialCipher::from_base64_key(
        &config.credential_master_key,
    )?);
    let breaker_policy = BreakerPolicy {
        failure_threshold: config.circuit_failure_threshold,
        success_threshold: config.circuit_success_threshold,
        open_timeout_secs: config.circuit_timeout_secs as i64,
    };

    // Build service layer
    let resilience_service = ResilienceService::new(
        Arc::clone(&persistence),
        cipher,
        breaker_policy,
        event_bus.clone(),
    );
    let queue_service = QueueService::new(
        Arc::clone(&persistence),
        Arc::new(HttpOperationDispatcher::new(&config)),
        resilience_service.clone(),
        event_bus.clone(),
        QueuePolicy {
            max_retries: config.queue_max_retries,
            drain_batch_size: i64::from(config.drain_batch_size),
            claim_timeout_secs: config.drain_claim_timeout_secs as i64,
        },
        config.collaborator_environment.clone(),
    );
    let notification_service = NotificationService::new(
        Arc::clone(&persistence),
        Arc::new(LoggingPushTransport),
        event_bus.clone(),
        i64::from(config.delivery_batch_size),
    );
    let device_service = DeviceService::new(Arc::clone(&persistence), event_bus.clone());
    let sync_service = SyncService::new(Arc::clone(&persistence), event_bus);

    // Build application state
    let app_state = AppState {
        device_service: Arc::new(device_service),
        sync_service: Arc::new(sync_service),
        queue_service: Arc::new(queue_service),
        notification_service: Arc::new(notification_service),
        resilience_service: Arc::new(resilience_service),
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
