//! HTTP surface of the hub
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check with broker connectivity
//! - `GET /api/stream` - Server-sent event stream of [`BroadcastEvent`]s
//! - `GET /api/snapshot` - Last-known telemetry of every unit
//! - `GET /api/tamper-status` - Aggregate (or `?tankerId=` single unit) liveness status
//! - `GET /api/tamper-status/units` - Liveness status of every unit
//! - `GET /api/email-logs` - Alert log, most recent first
//! - `POST /api/send-test-alert` - Dispatch a test alert
//! - `POST /api/alerts/reset` - Release the alert lock
//!
//! [`BroadcastEvent`]: crate::events::BroadcastEvent

pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ApiConfig;

pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/stream", get(routes::stream::event_stream))
        .route("/api/snapshot", get(routes::telemetry::snapshot))
        .route("/api/tamper-status", get(routes::tamper::tamper_status))
        .route("/api/tamper-status/units", get(routes::tamper::unit_statuses))
        .route("/api/email-logs", get(routes::alerts::email_logs))
        .route("/api/send-test-alert", post(routes::alerts::send_test_alert))
        .route("/api/alerts/reset", post(routes::alerts::reset_alert_lock))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Bind the API and serve it from a background task.
///
/// Returns the bound address, which differs from the configured one when port 0 is used.
pub async fn spawn_api_server(config: &ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let app = router(config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("API server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {e}");
        }
    });

    Ok(addr)
}
