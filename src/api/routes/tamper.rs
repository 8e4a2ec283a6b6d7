//! Liveness status endpoints

use axum::Json;
use axum::extract::{Query, State};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{TamperStatusQuery, TamperStatusResponse, UnitStatusesResponse};

/// GET /api/tamper-status?tankerId=
///
/// Without `tankerId` the aggregate over every tracked unit is returned.
pub async fn tamper_status(
    State(state): State<ApiState>,
    Query(query): Query<TamperStatusQuery>,
) -> ApiResult<Json<TamperStatusResponse>> {
    let unit_id = match query.tanker_id.as_deref().map(str::trim) {
        Some("") => {
            return Err(ApiError::InvalidRequest("tankerId must not be empty".to_string()));
        }
        other => other,
    };

    Ok(Json(TamperStatusResponse {
        success: true,
        status: state.hub.monitor().status(unit_id),
    }))
}

/// GET /api/tamper-status/units
pub async fn unit_statuses(State(state): State<ApiState>) -> Json<UnitStatusesResponse> {
    Json(UnitStatusesResponse {
        success: true,
        units: state.hub.monitor().all_statuses(),
    })
}
