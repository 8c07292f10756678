//! # Server Configuration
//!
//! This module contains the server setup and configuration for the droplet
//! gateway: shared state, router construction, and the background
//! maintenance loop that sweeps stuck rows and drives retries.

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::fluid::{DefaultEventProcessor, FluidClient};
use crate::handlers;
use crate::processing::{EventProcessor, ProcessingEngine};
use crate::telemetry;

/// Seconds between maintenance passes (stuck-row sweep + due retries).
const MAINTENANCE_INTERVAL_SECS: u64 = 60;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub crypto_key: CryptoKey,
    pub processor: Arc<dyn EventProcessor>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/api/webhook/fluid/{installation_id}",
            post(handlers::webhooks::receive_fluid_webhook),
        )
        .route(
            "/api/droplet/status/{installation_id}",
            get(handlers::droplet::droplet_status),
        )
        .route("/api/droplet/cleanup", post(handlers::droplet::cleanup))
        .layer(middleware::from_fn(install_trace_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Give every request a correlation id that error responses can echo.
async fn install_trace_context(request: Request, next: Next) -> Response {
    let trace_id = format!("req-{}", &uuid::Uuid::new_v4().to_string()[..8]);
    telemetry::with_trace_context(telemetry::TraceContext { trace_id }, next.run(request)).await
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let key_bytes = config
        .master_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("FLUID_MASTER_KEY is required to start the server"))?;
    let crypto_key =
        CryptoKey::new(key_bytes).map_err(|e| anyhow::anyhow!("invalid master key: {}", e))?;

    let client = FluidClient::new(config.fluid_api_base.clone());
    let processor: Arc<dyn EventProcessor> = Arc::new(DefaultEventProcessor::new(
        db.clone(),
        crypto_key.clone(),
        client,
    ));

    let state = AppState {
        db: db.clone(),
        config: Arc::new(config.clone()),
        crypto_key,
        processor: processor.clone(),
    };

    spawn_maintenance(db, config.clone(), processor);

    let app = create_app(state);
    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically release stuck rows and attempt due retries.
fn spawn_maintenance(db: DatabaseConnection, config: AppConfig, processor: Arc<dyn EventProcessor>) {
    tokio::spawn(async move {
        let engine = ProcessingEngine::new(config.processing.clone());
        let mut interval =
            tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
        loop {
            interval.tick().await;

            if let Err(err) = engine.sweep_stuck(&db).await {
                error!(error = %err, "stuck-row sweep failed");
            }
            match engine.retry_due(&db, processor.as_ref()).await {
                Ok(attempted) if attempted > 0 => {
                    info!(attempted, "retried due events");
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "retry pass failed"),
            }
        }
    });
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::webhooks::receive_fluid_webhook,
        crate::handlers::droplet::droplet_status,
        crate::handlers::droplet::cleanup,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::webhooks::WebhookAck,
            crate::handlers::droplet::DropletStatusResponse,
            crate::handlers::droplet::EventCounts,
            crate::handlers::droplet::ActivityEntry,
            crate::handlers::droplet::CleanupResponse,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Fluid Droplet API",
        description = "Webhook ingestion and tenant-scoped processing for the Fluid platform",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
