//! Telemetry ingress from the MQTT broker
//!
//! The [`IngressAdapter`] owns the broker connection and the [`UnitStateStore`]. Each
//! accepted message flows through the same path:
//!
//! ```text
//! publish on <unitId>/<kind>
//!     → ParsedMessage::parse      (discard + warn on IngressError)
//!     → UnitStateStore::apply     (merge, first-seen order)
//!     → LivenessMonitor::observe
//!     → EventBroadcaster::publish (BroadcastEvent::Telemetry)
//! ```
//!
//! [`IngressAdapter::handle_message`] is the whole pipeline without a broker, which is
//! what the tests drive.

pub mod mqtt;
pub mod parse;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, trace};

use crate::broadcast::EventBroadcaster;
use crate::clock::Clock;
use crate::config::MqttConfig;
use crate::events::{BroadcastEvent, TelemetryEvent};
use crate::liveness::LivenessMonitor;
use crate::telemetry::{UnitStateStore, UnitTelemetry};

use self::mqtt::MqttConnection;
use self::parse::ParsedMessage;

/// Why an inbound message was discarded
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("invalid topic format: {0:?}")]
    InvalidTopic(String),

    #[error("unsupported reading kind on topic {topic:?}")]
    UnknownKind { topic: String },

    #[error("malformed position payload from {unit_id}: {source}")]
    MalformedPosition {
        unit_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("non-numeric distance payload from {unit_id}: {payload:?}")]
    NonNumericDistance { unit_id: String, payload: String },
}

pub struct IngressAdapter {
    store: Mutex<UnitStateStore>,
    monitor: Arc<LivenessMonitor>,
    broadcaster: EventBroadcaster,
    clock: Arc<dyn Clock>,
    connected: Arc<AtomicBool>,
    connection: Mutex<Option<MqttConnection>>,
}

impl IngressAdapter {
    pub fn new(monitor: Arc<LivenessMonitor>, broadcaster: EventBroadcaster, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(UnitStateStore::new()),
            monitor,
            broadcaster,
            clock,
            connected: Arc::new(AtomicBool::new(false)),
            connection: Mutex::new(None),
        }
    }

    /// Start the broker connection. A second call while connected is a no-op.
    ///
    /// Returns immediately; the connection itself is established (and re-established
    /// after loss) by a background task.
    #[instrument(skip(self, config), fields(host = %config.host, port = config.port))]
    pub fn connect(self: &Arc<Self>, config: &MqttConfig) {
        let mut connection = self.connection.lock();
        if connection.is_some() {
            debug!("already connected, ignoring connect request");
            return;
        }

        info!("connecting to MQTT broker");
        *connection = Some(mqtt::spawn_event_loop(
            Arc::downgrade(self),
            self.connected.clone(),
            config,
        ));
    }

    /// Drop the broker connection. Idempotent.
    pub fn disconnect(&self) {
        let Some(connection) = self.connection.lock().take() else {
            trace!("not connected, nothing to disconnect");
            return;
        };

        connection.close();
        self.connected.store(false, Ordering::Release);
        info!("disconnected from MQTT broker");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Run one inbound message through parse, store, monitor and broadcast.
    ///
    /// Invalid messages are rejected before anything is mutated.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) -> Result<TelemetryEvent, IngressError> {
        let ParsedMessage { unit_id, reading } = ParsedMessage::parse(topic, payload)?;
        let now = self.clock.now();

        let (merged, created) = self.store.lock().apply(&unit_id, &reading, now);
        if created {
            info!("discovered unit {unit_id}");
        }
        trace!("{unit_id} {} updated: {reading:?}", reading.kind().suffix());

        self.monitor.observe(&unit_id, merged.lat, merged.lon);

        let event = TelemetryEvent::from_reading(&unit_id, &reading, now, Some(topic.to_string()));
        self.broadcaster.publish(&BroadcastEvent::Telemetry(event.clone()));

        Ok(event)
    }

    /// Point-in-time copy of every known unit, in first-seen order
    pub fn snapshot(&self) -> Vec<UnitTelemetry> {
        self.store.lock().snapshot()
    }

    pub fn unit(&self, unit_id: &str) -> Option<UnitTelemetry> {
        self.store.lock().get(unit_id).cloned()
    }

    /// Forget every unit. The connection is left as it is.
    pub fn reset(&self) {
        self.store.lock().clear();
        debug!("unit state store cleared");
    }
}

impl Drop for IngressAdapter {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.close();
        }
    }
}
