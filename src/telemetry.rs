//! Last-known telemetry per unit
//!
//! The [`UnitStateStore`] is written only by the ingress adapter. Entries are created
//! on the first message from an identifier and never removed; a unit that stops
//! reporting simply keeps its last values while the liveness monitor flags it offline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-known telemetry of a single unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitTelemetry {
    pub id: String,

    /// When the most recent message for this unit was received
    #[serde(rename = "ts", with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_cm: Option<f64>,
}

impl UnitTelemetry {
    fn new(id: String, at: DateTime<Utc>) -> Self {
        Self {
            id,
            last_seen: at,
            lat: None,
            lon: None,
            distance_cm: None,
        }
    }

    /// Overwrite only the fields carried by `reading`.
    fn merge(&mut self, reading: &Reading, at: DateTime<Utc>) {
        match *reading {
            Reading::Position { lat, lon } => {
                self.lat = Some(lat);
                self.lon = Some(lon);
            }
            Reading::Distance { cm } => {
                self.distance_cm = Some(cm);
            }
        }
        self.last_seen = at;
    }
}

/// A successfully decoded telemetry payload
///
/// Decoding failures never produce a `Reading`; see [`crate::ingress::IngressError`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Position { lat: f64, lon: f64 },
    Distance { cm: f64 },
}

impl Reading {
    pub fn kind(&self) -> ReadingKind {
        match self {
            Reading::Position { .. } => ReadingKind::Position,
            Reading::Distance { .. } => ReadingKind::Distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    Position,
    Distance,
}

impl ReadingKind {
    /// Topic suffix this kind is published under
    pub fn suffix(&self) -> &'static str {
        match self {
            ReadingKind::Position => "gps",
            ReadingKind::Distance => "distance",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "gps" => Some(ReadingKind::Position),
            "distance" => Some(ReadingKind::Distance),
            _ => None,
        }
    }
}

/// Insertion-ordered map from unit id to its last-known telemetry
#[derive(Debug, Default)]
pub struct UnitStateStore {
    units: Vec<UnitTelemetry>,
    index: HashMap<String, usize>,
}

impl UnitStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a reading into the unit's entry, creating the entry on first sight.
    ///
    /// Returns the merged state and whether the unit was previously unknown.
    pub fn apply(&mut self, unit_id: &str, reading: &Reading, at: DateTime<Utc>) -> (UnitTelemetry, bool) {
        let (slot, created) = match self.index.get(unit_id) {
            Some(&slot) => (slot, false),
            None => {
                let slot = self.units.len();
                self.units.push(UnitTelemetry::new(unit_id.to_string(), at));
                self.index.insert(unit_id.to_string(), slot);
                (slot, true)
            }
        };

        let unit = &mut self.units[slot];
        unit.merge(reading, at);
        (unit.clone(), created)
    }

    pub fn get(&self, unit_id: &str) -> Option<&UnitTelemetry> {
        self.index.get(unit_id).map(|&slot| &self.units[slot])
    }

    /// Point-in-time copy of every unit, in first-seen order
    pub fn snapshot(&self) -> Vec<UnitTelemetry> {
        self.units.clone()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.index.clear();
    }
}
