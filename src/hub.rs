//! The process-wide context
//!
//! [`Hub`] builds every component once and wires them together:
//!
//! ```text
//!                ┌──────────────► EventBroadcaster ──► subscribers (SSE, tests)
//!                │                     ▲
//! IngressAdapter ┼─► LivenessMonitor ──┤
//!   (MQTT)       │        │ sweep      │
//!                │        ▼            │
//!                │   AlertDispatcher ──┴─► Notifier, AlertLog
//! ```
//!
//! Components are reachable through accessors; nothing is global. Tests build a hub
//! with [`Hub::with_parts`] to inject a clock, a notifier and an alert log.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::alerts::AlertDispatcher;
use crate::alerts::log::{AlertLog, MemoryAlertLog};
use crate::alerts::notifier::{self, Notifier};
use crate::broadcast::EventBroadcaster;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::ingress::IngressAdapter;
use crate::liveness::{LivenessMonitor, SweepHandle};

pub struct Hub {
    config: Config,
    clock: Arc<dyn Clock>,
    broadcaster: EventBroadcaster,
    alert_log: Arc<dyn AlertLog>,
    dispatcher: Arc<AlertDispatcher>,
    monitor: Arc<LivenessMonitor>,
    ingress: Arc<IngressAdapter>,
    sweep: Mutex<Option<SweepHandle>>,
}

impl Hub {
    /// Build a hub with the wall clock, an in-memory alert log and the delivery
    /// channel selected by the alert configuration.
    pub fn new(config: Config) -> Result<Self> {
        let notifier: Arc<dyn Notifier> = Arc::from(notifier::from_config(&config.alerts)?);
        info!("alert channel: {}", notifier.name());

        Ok(Self::with_parts(
            config,
            Arc::new(SystemClock),
            notifier,
            Arc::new(MemoryAlertLog::new()),
        ))
    }

    pub fn with_parts(
        config: Config,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        alert_log: Arc<dyn AlertLog>,
    ) -> Self {
        let broadcaster = EventBroadcaster::new();
        let dispatcher = Arc::new(AlertDispatcher::new(
            config.alerts.email.clone(),
            notifier,
            alert_log.clone(),
            clock.clone(),
        ));
        let monitor = Arc::new(LivenessMonitor::new(
            &config.liveness,
            clock.clone(),
            dispatcher.clone(),
            broadcaster.clone(),
        ));
        let ingress = Arc::new(IngressAdapter::new(
            monitor.clone(),
            broadcaster.clone(),
            clock.clone(),
        ));

        Self {
            config,
            clock,
            broadcaster,
            alert_log,
            dispatcher,
            monitor,
            ingress,
            sweep: Mutex::new(None),
        }
    }

    /// Connect to the broker and start the periodic sweep.
    pub fn start(&self) {
        self.ingress.connect(&self.config.mqtt);
        self.start_sweep();
    }

    /// Start only the periodic sweep. A running sweep is left alone.
    pub fn start_sweep(&self) {
        let mut sweep = self.sweep.lock();
        if sweep.as_ref().is_some_and(SweepHandle::is_running) {
            debug!("sweep already running");
            return;
        }

        *sweep = Some(self.monitor.start());
        info!(
            "liveness sweep started (timeout {}ms, every {}ms)",
            self.config.liveness.timeout_ms, self.config.liveness.sweep_interval_ms
        );
    }

    /// Stop the sweep and disconnect from the broker. Idempotent.
    pub async fn shutdown(&self) {
        let sweep = self.sweep.lock().take();
        if let Some(sweep) = sweep {
            sweep.shutdown().await;
        }
        self.ingress.disconnect();
        debug!("hub shut down");
    }

    /// Clear units, liveness state, the alert lock and every subscriber.
    ///
    /// The connection, the running sweep and the alert log are kept.
    pub fn reset(&self) {
        self.ingress.reset();
        self.monitor.reset();
        self.dispatcher.reset();
        self.broadcaster.clear();
        info!("hub state reset");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ingress(&self) -> &Arc<IngressAdapter> {
        &self.ingress
    }

    pub fn monitor(&self) -> &Arc<LivenessMonitor> {
        &self.monitor
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn alert_log(&self) -> &Arc<dyn AlertLog> {
        &self.alert_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::notifier::LogNotifier;
    use crate::clock::ManualClock;

    fn hub() -> (Hub, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let mut config = Config::default();
        config.alerts.email = Some("ops@example.com".to_string());

        let hub = Hub::with_parts(
            config,
            clock.clone(),
            Arc::new(LogNotifier),
            Arc::new(MemoryAlertLog::new()),
        );
        (hub, clock)
    }

    #[tokio::test]
    async fn test_reset_clears_everything_but_the_log() {
        let (hub, clock) = hub();
        hub.broadcaster().subscribe(|_| Ok(()));
        hub.ingress().handle_message("T001/distance", b"10").unwrap();

        clock.advance_ms(61_000);
        hub.monitor().sweep().outcomes().await;
        assert!(hub.dispatcher().is_locked());

        hub.reset();

        assert!(hub.ingress().snapshot().is_empty());
        assert_eq!(hub.monitor().tracked_units(), 0);
        assert!(!hub.dispatcher().is_locked());
        assert_eq!(hub.broadcaster().subscriber_count(), 0);
        assert_eq!(hub.alert_log().list().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_start_and_shutdown_are_idempotent() {
        let (hub, _clock) = hub();

        hub.start_sweep();
        hub.start_sweep();
        assert!(hub.sweep.lock().as_ref().is_some_and(SweepHandle::is_running));

        hub.shutdown().await;
        hub.shutdown().await;
        assert!(hub.sweep.lock().is_none());
        assert!(!hub.ingress().is_connected());
    }
}
