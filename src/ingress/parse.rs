//! Topic and payload decoding
//!
//! Topics have the shape `<unitId>/<kind>`. Position payloads are JSON objects with
//! numeric `lat` and `lon`; distance payloads are a bare number in centimeters.
//! Anything else is rejected with an [`IngressError`] and never reaches the store.

use serde::Deserialize;

use crate::telemetry::{Reading, ReadingKind};

use super::IngressError;

const TOPIC_DELIMITER: char = '/';

/// A message that decoded into a unit id and a reading
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub unit_id: String,
    pub reading: Reading,
}

#[derive(Debug, Deserialize)]
struct PositionPayload {
    lat: f64,
    lon: f64,
}

impl ParsedMessage {
    pub fn parse(topic: &str, payload: &[u8]) -> Result<Self, IngressError> {
        let (unit_id, kind) = split_topic(topic)?;

        let reading = match kind {
            ReadingKind::Position => parse_position(unit_id, payload)?,
            ReadingKind::Distance => parse_distance(unit_id, payload)?,
        };

        Ok(Self {
            unit_id: unit_id.to_string(),
            reading,
        })
    }
}

/// Split `<unitId>/<kind>` into exactly two non-empty segments.
pub fn split_topic(topic: &str) -> Result<(&str, ReadingKind), IngressError> {
    let mut segments = topic.split(TOPIC_DELIMITER);
    let (Some(unit_id), Some(suffix), None) = (segments.next(), segments.next(), segments.next()) else {
        return Err(IngressError::InvalidTopic(topic.to_string()));
    };

    if unit_id.is_empty() {
        return Err(IngressError::InvalidTopic(topic.to_string()));
    }

    let kind = ReadingKind::from_suffix(suffix).ok_or_else(|| IngressError::UnknownKind {
        topic: topic.to_string(),
    })?;

    Ok((unit_id, kind))
}

fn parse_position(unit_id: &str, payload: &[u8]) -> Result<Reading, IngressError> {
    let position: PositionPayload =
        serde_json::from_slice(payload).map_err(|source| IngressError::MalformedPosition {
            unit_id: unit_id.to_string(),
            source,
        })?;

    if !position.lat.is_finite() || !position.lon.is_finite() {
        return Err(IngressError::MalformedPosition {
            unit_id: unit_id.to_string(),
            source: serde::de::Error::custom("coordinates must be finite"),
        });
    }

    Ok(Reading::Position {
        lat: position.lat,
        lon: position.lon,
    })
}

fn parse_distance(unit_id: &str, payload: &[u8]) -> Result<Reading, IngressError> {
    let text = String::from_utf8_lossy(payload);
    let non_numeric = || IngressError::NonNumericDistance {
        unit_id: unit_id.to_string(),
        payload: text.to_string(),
    };

    let cm: f64 = text.trim().parse().map_err(|_| non_numeric())?;
    if !cm.is_finite() {
        return Err(non_numeric());
    }

    Ok(Reading::Distance { cm })
}
