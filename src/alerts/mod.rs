//! Offline-alert delivery with a process-wide single-shot lock
//!
//! The [`AlertDispatcher`] sends at most one notification until [`AlertDispatcher::reset`]
//! is called, no matter how many units go offline. This lock is separate from the
//! per-unit `alertSent` flag kept by the liveness monitor: the monitor's flag stops
//! repeated dispatch calls for one outage, the dispatcher's lock caps delivery volume.
//!
//! ```text
//! dispatch(attempt)
//!     ├─ no destination configured ─► Suppressed
//!     ├─ lock already taken ────────► Suppressed
//!     └─ take lock ─► notifier.deliver ─► Sent | Failed
//!                                         (lock stays taken either way)
//! ```
//!
//! Every outcome is appended to the [`AlertLog`].

pub mod log;
pub mod notifier;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::clock::Clock;

use self::log::{AlertLog, DeliveryStatus, NewLogEntry};
use self::notifier::Notifier;

/// Position reported by [`AlertDispatcher::send_test_alert`]
pub const TEST_ALERT_POSITION: (f64, f64) = (19.077, 72.8787);

/// Offline duration reported by [`AlertDispatcher::send_test_alert`]
pub const TEST_ALERT_OFFLINE_MS: i64 = 120_000;

/// Details of one detected offline transition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAttempt {
    #[serde(rename = "tankerId", skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_lat: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_lon: Option<f64>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_data_received: DateTime<Utc>,

    #[serde(serialize_with = "crate::util::delta_millis::serialize")]
    pub offline_duration: TimeDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    Sent,
    Failed,
    Suppressed,
}

impl From<DispatchOutcome> for DeliveryStatus {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Sent => DeliveryStatus::Sent,
            DispatchOutcome::Failed => DeliveryStatus::Failed,
            DispatchOutcome::Suppressed => DeliveryStatus::Suppressed,
        }
    }
}

/// A rendered alert, ready for a [`Notifier`]
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub unit_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AlertMessage {
    pub fn render(to: &str, attempt: &NotificationAttempt) -> Self {
        Self {
            to: to.to_string(),
            subject: subject_for(attempt),
            text: body_for(attempt),
            unit_id: attempt.unit_id.clone(),
            timestamp: attempt.timestamp,
        }
    }
}

pub fn subject_for(attempt: &NotificationAttempt) -> String {
    match &attempt.unit_id {
        Some(unit_id) => format!("SWAT ALERT - {unit_id} Communication Lost"),
        None => "SWAT TAMPER ALERT - Communication Lost".to_string(),
    }
}

fn body_for(attempt: &NotificationAttempt) -> String {
    let unit = match &attempt.unit_id {
        Some(unit_id) => format!("Tanker: {unit_id}"),
        None => "Water Tanker".to_string(),
    };
    let location = match (attempt.last_known_lat, attempt.last_known_lon) {
        (Some(lat), Some(lon)) => format!("{lat:.4}, {lon:.4}"),
        _ => "Unknown".to_string(),
    };

    format!(
        "SWAT TAMPER ALERT\n\n\
         {unit} communication lost!\n\n\
         Offline for: {} minute(s)\n\
         Last seen: {}\n\
         Location: {location}\n\n\
         Possible tampering detected. Check hardware immediately.",
        attempt.offline_duration.num_minutes(),
        attempt.last_data_received.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

pub struct AlertDispatcher {
    destination: Option<String>,
    notifier: Arc<dyn Notifier>,
    log: Arc<dyn AlertLog>,
    clock: Arc<dyn Clock>,
    locked: AtomicBool,
}

impl AlertDispatcher {
    pub fn new(
        destination: Option<String>,
        notifier: Arc<dyn Notifier>,
        log: Arc<dyn AlertLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            destination,
            notifier,
            log,
            clock,
            locked: AtomicBool::new(false),
        }
    }

    #[instrument(skip(self, attempt), fields(unit_id = attempt.unit_id.as_deref().unwrap_or("-")))]
    pub async fn dispatch(&self, attempt: NotificationAttempt) -> DispatchOutcome {
        let Some(destination) = self.destination.clone() else {
            info!("no alert destination configured, alert suppressed");
            return self.record(None, &attempt, DispatchOutcome::Suppressed);
        };

        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("an alert was already sent, suppressed until reset");
            return self.record(Some(destination), &attempt, DispatchOutcome::Suppressed);
        }

        let message = AlertMessage::render(&destination, &attempt);
        info!(to = %destination, notifier = self.notifier.name(), "sending tamper alert");

        let outcome = match self.notifier.deliver(&message).await {
            Ok(()) => {
                info!("tamper alert sent");
                DispatchOutcome::Sent
            }
            Err(e) => {
                error!("failed to deliver tamper alert: {e:#}");
                DispatchOutcome::Failed
            }
        };

        self.record(Some(destination), &attempt, outcome)
    }

    fn record(
        &self,
        to: Option<String>,
        attempt: &NotificationAttempt,
        outcome: DispatchOutcome,
    ) -> DispatchOutcome {
        self.log.append(NewLogEntry {
            timestamp: self.clock.now(),
            to,
            subject: subject_for(attempt),
            status: outcome.into(),
            attempt: attempt.clone(),
        });
        outcome
    }

    /// Dispatch a unit-less alert at a fixed position, under the same guards.
    pub async fn send_test_alert(&self) -> DispatchOutcome {
        let now = self.clock.now();
        let offline_duration = TimeDelta::milliseconds(TEST_ALERT_OFFLINE_MS);
        let (lat, lon) = TEST_ALERT_POSITION;

        self.dispatch(NotificationAttempt {
            unit_id: None,
            timestamp: now,
            last_known_lat: Some(lat),
            last_known_lon: Some(lon),
            last_data_received: now - offline_duration,
            offline_duration,
        })
        .await
    }

    /// Release the single-shot lock. Returns whether it was held.
    pub fn reset(&self) -> bool {
        let was_locked = self.locked.swap(false, Ordering::AcqRel);
        if was_locked {
            info!("alert lock released, ready for the next alert");
        }
        was_locked
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}
