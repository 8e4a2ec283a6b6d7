//! Alert log and alert control endpoints

use anyhow::Context;
use axum::Json;
use axum::extract::State;
use tracing::info;

use crate::alerts::DispatchOutcome;
use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::api::types::{AlertLogResponse, AlertResetResponse, TestAlertResponse};

/// GET /api/email-logs
pub async fn email_logs(State(state): State<ApiState>) -> Json<AlertLogResponse> {
    Json(AlertLogResponse {
        success: true,
        logs: state.hub.alert_log().list(),
    })
}

/// POST /api/send-test-alert
///
/// The dispatch runs in its own task so a client hanging up does not cancel it.
pub async fn send_test_alert(State(state): State<ApiState>) -> ApiResult<Json<TestAlertResponse>> {
    info!("test alert requested");
    let dispatcher = state.hub.dispatcher().clone();
    let outcome = tokio::spawn(async move { dispatcher.send_test_alert().await })
        .await
        .context("test alert task failed")?;

    let message = match outcome {
        DispatchOutcome::Sent => "Test alert sent",
        DispatchOutcome::Failed => "Test alert delivery failed",
        DispatchOutcome::Suppressed => {
            "Test alert suppressed: no destination configured or an alert was already sent"
        }
    };

    Ok(Json(TestAlertResponse {
        success: outcome == DispatchOutcome::Sent,
        outcome,
        message: message.to_string(),
    }))
}

/// POST /api/alerts/reset
pub async fn reset_alert_lock(State(state): State<ApiState>) -> Json<AlertResetResponse> {
    Json(AlertResetResponse {
        success: true,
        was_locked: state.hub.dispatcher().reset(),
    })
}
