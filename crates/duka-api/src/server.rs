//! HTTP server configuration and request routing.
//!
//! Assembles the Axum router with the middleware stack. Requests flow
//! through, in order:
//! 1. Request ID generation
//! 2. Request/response tracing
//! 3. Timeout enforcement
//! 4. Tenant resolution (public paths pass through)
//! 5. Handler execution
//!
//! The server shuts down gracefully on SIGINT/SIGTERM, draining in-flight
//! requests before the pool closes.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use duka_core::Storage;
use duka_idempotency::IdempotencyGuard;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config, handlers, middleware::tenant::tenant_middleware, processor::WebhookProcessor,
};

/// Shared application state for handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    /// Storage layer providing repository and session access.
    pub storage: Storage,
    /// At-most-once execution guard.
    pub guard: IdempotencyGuard,
    /// Business processor invoked for recorded webhooks.
    pub processor: Arc<dyn WebhookProcessor>,
    /// Service configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates application state.
    pub fn new(
        storage: Storage,
        guard: IdempotencyGuard,
        processor: Arc<dyn WebhookProcessor>,
        config: Config,
    ) -> Self {
        Self { storage, guard, processor, config: Arc::new(config) }
    }
}

/// Creates the Axum router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout);

    let probe_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check));

    let api_routes = Router::new()
        .route("/webhooks/{provider}", post(handlers::receive_webhook))
        .route("/payments/charge", post(handlers::initiate_charge))
        .route("/orders", get(handlers::list_orders));

    Router::new()
        .merge(probe_routes)
        .merge(api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), tenant_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject a request ID into all responses.
///
/// Adds an X-Request-Id header for tracing requests across services.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Starts the HTTP server with graceful shutdown support.
///
/// # Errors
///
/// Returns `std::io::Error` if the port is in use or the interface is
/// unavailable.
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = create_router(state);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Waiting for in-flight requests to complete");
}
