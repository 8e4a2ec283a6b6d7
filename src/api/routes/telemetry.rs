use axum::Json;
use axum::extract::State;

use crate::api::state::ApiState;
use crate::api::types::SnapshotResponse;

/// GET /api/snapshot
pub async fn snapshot(State(state): State<ApiState>) -> Json<SnapshotResponse> {
    let ingress = state.hub.ingress();
    Json(SnapshotResponse {
        connected: ingress.is_connected(),
        tankers: ingress.snapshot(),
    })
}
