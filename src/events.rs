//! Normalized events relayed to push-stream subscribers
//!
//! Every variant serializes to the JSON shape the live dashboard consumes, tagged
//! by a `type` field:
//!
//! ```text
//! {"type":"ready"}
//! {"type":"snapshot","tankers":[{"id","ts","lat"?,"lon"?,"distanceCm"?}, ...]}
//! {"type":"mqtt","ts","tankerId","lat"?,"lon"?,"distanceCm"?,"topic"?}
//! {"type":"tamper","tankerId","isOnline","offlineDuration","alertSent"}
//! ```
//!
//! Events are plain owned values; the broadcaster hands each subscriber its own clone.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::telemetry::{Reading, UnitTelemetry};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BroadcastEvent {
    /// First message on every new stream
    Ready,

    /// Current state of every known unit, sent to late subscribers
    Snapshot { tankers: Vec<UnitTelemetry> },

    /// One accepted telemetry message
    #[serde(rename = "mqtt")]
    Telemetry(TelemetryEvent),

    /// A unit went offline or came back
    #[serde(rename = "tamper")]
    LivenessChange(LivenessChange),
}

impl BroadcastEvent {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastEvent::Ready => "ready",
            BroadcastEvent::Snapshot { .. } => "snapshot",
            BroadcastEvent::Telemetry(_) => "mqtt",
            BroadcastEvent::LivenessChange(_) => "tamper",
        }
    }
}

/// Fields of a single telemetry message; only what the message carried is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: DateTime<Utc>,

    #[serde(rename = "tankerId")]
    pub unit_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_cm: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl TelemetryEvent {
    pub fn from_reading(unit_id: &str, reading: &Reading, ts: DateTime<Utc>, topic: Option<String>) -> Self {
        let (lat, lon, distance_cm) = match *reading {
            Reading::Position { lat, lon } => (Some(lat), Some(lon), None),
            Reading::Distance { cm } => (None, None, Some(cm)),
        };

        Self {
            ts,
            unit_id: unit_id.to_string(),
            lat,
            lon,
            distance_cm,
            topic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessChange {
    #[serde(rename = "tankerId")]
    pub unit_id: String,

    pub is_online: bool,

    #[serde(serialize_with = "crate::util::delta_millis::serialize")]
    pub offline_duration: TimeDelta,

    pub alert_sent: bool,
}
