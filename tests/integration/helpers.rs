//! Helper functions for integration tests

use std::sync::Arc;

use parking_lot::Mutex;
use tanker_watch::alerts::log::MemoryAlertLog;
use tanker_watch::alerts::notifier::{LogNotifier, Notifier};
use tanker_watch::broadcast::{EventBroadcaster, Subscription};
use tanker_watch::clock::ManualClock;
use tanker_watch::config::Config;
use tanker_watch::events::{BroadcastEvent, LivenessChange};
use tanker_watch::hub::Hub;

pub struct TestHub {
    pub hub: Arc<Hub>,
    pub clock: Arc<ManualClock>,
    pub log: Arc<MemoryAlertLog>,
}

pub fn test_config(destination: Option<&str>) -> Config {
    let mut config = Config::default();
    config.alerts.email = destination.map(str::to_string);
    config.liveness.timeout_ms = 60_000;
    config.api.bind_addr = "127.0.0.1:0".parse().unwrap();
    config
}

pub fn test_hub(destination: Option<&str>) -> TestHub {
    test_hub_with_notifier(destination, Arc::new(LogNotifier))
}

pub fn test_hub_with_notifier(destination: Option<&str>, notifier: Arc<dyn Notifier>) -> TestHub {
    let clock = Arc::new(ManualClock::at_epoch());
    let log = Arc::new(MemoryAlertLog::new());
    let hub = Arc::new(Hub::with_parts(
        test_config(destination),
        clock.clone(),
        notifier,
        log.clone(),
    ));

    TestHub { hub, clock, log }
}

/// Collect every published event into a shared vector.
pub fn record_events(broadcaster: &EventBroadcaster) -> (Arc<Mutex<Vec<BroadcastEvent>>>, Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = broadcaster.subscribe(move |event| {
        sink.lock().push(event);
        Ok(())
    });
    (events, subscription)
}

pub fn liveness_changes(events: &[BroadcastEvent]) -> Vec<LivenessChange> {
    events
        .iter()
        .filter_map(|event| match event {
            BroadcastEvent::LivenessChange(change) => Some(change.clone()),
            _ => None,
        })
        .collect()
}
