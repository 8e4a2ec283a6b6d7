//! Health check endpoint

use axum::Json;
use axum::extract::State;

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;

/// GET /api/health
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: state.hub.clock().now().to_rfc3339(),
        mqtt_connected: state.hub.ingress().is_connected(),
    })
}
