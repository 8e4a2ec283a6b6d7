//! Response bodies of the HTTP API
//!
//! Field names are camelCase to match what the dashboard reads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::alerts::DispatchOutcome;
use crate::alerts::log::AlertLogEntry;
use crate::liveness::UnitStatus;
use crate::telemetry::UnitTelemetry;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub mqtt_connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResponse {
    pub connected: bool,
    pub tankers: Vec<UnitTelemetry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TamperStatusQuery {
    #[serde(rename = "tankerId")]
    pub tanker_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TamperStatusResponse {
    pub success: bool,

    #[serde(flatten)]
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitStatusesResponse {
    pub success: bool,
    pub units: BTreeMap<String, UnitStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertLogResponse {
    pub success: bool,
    pub logs: Vec<AlertLogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestAlertResponse {
    pub success: bool,
    pub outcome: DispatchOutcome,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResetResponse {
    pub success: bool,
    pub was_locked: bool,
}
