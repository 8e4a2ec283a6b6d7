//! End-to-end tests of the ingress → liveness → alert → broadcast pipeline
//!
//! Messages are injected through `IngressAdapter::handle_message`, time is driven by
//! a `ManualClock` and sweeps are run directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tanker_watch::alerts::DispatchOutcome;
use tanker_watch::alerts::log::{AlertLog, DeliveryStatus};
use tanker_watch::alerts::notifier::WebhookNotifier;
use tanker_watch::broadcast::Subscription;
use tanker_watch::events::BroadcastEvent;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{liveness_changes, record_events, test_hub, test_hub_with_notifier};

#[tokio::test]
async fn test_silent_unit_goes_offline_with_one_alert() {
    let t = test_hub(Some("ops@example.com"));
    let ingress = t.hub.ingress();

    ingress
        .handle_message("T001/gps", br#"{"lat":19.0,"lon":72.9}"#)
        .unwrap();
    t.clock.advance_ms(1_000);
    ingress.handle_message("T001/distance", b"50").unwrap();

    t.clock.advance_ms(61_000);
    let report = t.hub.monitor().sweep();
    assert_eq!(report.outcomes().await, vec![DispatchOutcome::Sent]);

    let status = t.hub.monitor().status(Some("T001"));
    assert!(!status.is_online);
    assert!(status.alert_sent);
    assert_eq!(status.offline_duration.num_milliseconds(), 61_000);

    let entries = t.log.list();
    assert_eq!(entries.len(), 1);
    let attempt = &entries[0].attempt;
    assert_eq!(attempt.unit_id.as_deref(), Some("T001"));
    assert_eq!(attempt.last_known_lat, Some(19.0));
    assert_eq!(attempt.last_known_lon, Some(72.9));
    assert_eq!(attempt.offline_duration.num_milliseconds(), 61_000);

    // the store kept both readings
    let unit = ingress.unit("T001").unwrap();
    assert_eq!((unit.lat, unit.lon, unit.distance_cm), (Some(19.0), Some(72.9), Some(50.0)));
}

#[tokio::test]
async fn test_flapping_unit_and_dispatcher_lock() {
    let t = test_hub(Some("ops@example.com"));
    let (events, _subscription) = record_events(t.hub.broadcaster());
    let ingress = t.hub.ingress();

    ingress.handle_message("T001/distance", b"10").unwrap();
    t.clock.advance_ms(61_000);
    assert_eq!(t.hub.monitor().sweep().outcomes().await, vec![DispatchOutcome::Sent]);

    // data resumes, the unit recovers and may alert again on its next outage
    ingress.handle_message("T001/distance", b"11").unwrap();
    assert!(!t.hub.monitor().status(Some("T001")).alert_sent);

    t.clock.advance_ms(61_000);
    // the dispatcher's own lock still holds
    assert_eq!(
        t.hub.monitor().sweep().outcomes().await,
        vec![DispatchOutcome::Suppressed]
    );

    ingress.handle_message("T001/distance", b"12").unwrap();
    assert!(t.hub.dispatcher().reset());
    t.clock.advance_ms(61_000);
    assert_eq!(t.hub.monitor().sweep().outcomes().await, vec![DispatchOutcome::Sent]);

    let statuses: Vec<_> = t.log.list().into_iter().rev().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![DeliveryStatus::Sent, DeliveryStatus::Suppressed, DeliveryStatus::Sent]
    );

    let online: Vec<_> = liveness_changes(&events.lock())
        .into_iter()
        .map(|change| change.is_online)
        .collect();
    assert_eq!(online, vec![false, true, false, true, false]);
}

#[tokio::test]
async fn test_units_are_tracked_independently() {
    let t = test_hub(None);
    let ingress = t.hub.ingress();

    ingress.handle_message("T001/distance", b"10").unwrap();
    t.clock.advance_ms(30_000);
    ingress.handle_message("T002/distance", b"20").unwrap();
    t.clock.advance_ms(31_000);

    let report = t.hub.monitor().sweep();
    assert_eq!(report.went_offline, vec!["T001"]);
    report.outcomes().await;

    assert!(t.hub.monitor().status(Some("T002")).is_online);
    assert!(!t.hub.monitor().status(None).is_online);

    let units = t.hub.monitor().all_statuses();
    assert_eq!(units.len(), 2);
    assert!(!units["T001"].is_online);
    assert!(units["T002"].is_online);
}

#[tokio::test]
async fn test_missing_destination_logs_suppressed_attempt() {
    let t = test_hub(None);
    t.hub.ingress().handle_message("T009/distance", b"1").unwrap();
    t.clock.advance_ms(60_001);

    assert_eq!(
        t.hub.monitor().sweep().outcomes().await,
        vec![DispatchOutcome::Suppressed]
    );
    assert!(!t.hub.dispatcher().is_locked());
    assert!(t.hub.monitor().status(Some("T009")).alert_sent);

    let entries = t.log.list();
    assert_eq!(entries[0].status, DeliveryStatus::Suppressed);
    assert_eq!(entries[0].to, None);
}

#[tokio::test]
async fn test_webhook_channel_end_to_end() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(serde_json::json!({
            "tankerId": "T001",
            "subject": "SWAT ALERT - T001 Communication Lost",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(&format!("{}/alerts", mock_server.uri())).unwrap();
    let t = test_hub_with_notifier(Some("ops@example.com"), Arc::new(notifier));

    t.hub.ingress().handle_message("T001/gps", br#"{"lat":1.5,"lon":2.5}"#).unwrap();
    t.clock.advance_ms(90_000);

    assert_eq!(t.hub.monitor().sweep().outcomes().await, vec![DispatchOutcome::Sent]);
    // a second outage report for other units is suppressed before reaching the webhook
    t.hub.ingress().handle_message("T002/distance", b"1").unwrap();
    t.clock.advance_ms(90_000);
    assert_eq!(
        t.hub.monitor().sweep().outcomes().await,
        vec![DispatchOutcome::Suppressed]
    );
}

#[tokio::test]
async fn test_webhook_failure_is_recorded() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(&mock_server.uri()).unwrap();
    let t = test_hub_with_notifier(Some("ops@example.com"), Arc::new(notifier));

    t.hub.ingress().handle_message("T001/distance", b"5").unwrap();
    t.clock.advance_ms(61_000);

    assert_eq!(t.hub.monitor().sweep().outcomes().await, vec![DispatchOutcome::Failed]);
    assert_eq!(t.log.list()[0].status, DeliveryStatus::Failed);
    // a failed send still counts as the unit's alert
    assert!(t.hub.monitor().status(Some("T001")).alert_sent);
}

#[test]
fn test_self_unsubscribing_subscriber() {
    let t = test_hub(None);
    let broadcaster = t.hub.broadcaster();

    let first = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let subscription = {
        let first = first.clone();
        let slot = slot.clone();
        broadcaster.subscribe(move |_| {
            first.fetch_add(1, Ordering::SeqCst);
            if let Some(subscription) = slot.lock().take() {
                subscription.unsubscribe();
            }
            Ok(())
        })
    };
    *slot.lock() = Some(subscription);

    let (second, _second_subscription) = record_events(broadcaster);

    let ingress = t.hub.ingress();
    ingress.handle_message("T001/distance", b"1").unwrap();
    ingress.handle_message("T001/distance", b"2").unwrap();
    ingress.handle_message("T001/distance", b"3").unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 1);

    let received: Vec<_> = second
        .lock()
        .iter()
        .filter_map(|event| match event {
            BroadcastEvent::Telemetry(telemetry) => telemetry.distance_cm,
            _ => None,
        })
        .collect();
    assert_eq!(received, vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_failing_subscriber_does_not_block_pipeline() {
    let t = test_hub(None);
    t.hub.broadcaster().subscribe(|_| anyhow::bail!("socket closed"));
    let (events, _subscription) = record_events(t.hub.broadcaster());

    t.hub.ingress().handle_message("T001/distance", b"7").unwrap();

    assert_eq!(events.lock().len(), 1);
    assert_eq!(t.hub.ingress().snapshot().len(), 1);
}

#[tokio::test]
async fn test_reset_isolates_runs() {
    let t = test_hub(Some("ops@example.com"));
    let (_events, _subscription) = record_events(t.hub.broadcaster());
    t.hub.ingress().handle_message("T001/distance", b"7").unwrap();
    t.clock.advance_ms(61_000);
    t.hub.monitor().sweep().outcomes().await;

    t.hub.reset();

    assert!(t.hub.ingress().snapshot().is_empty());
    assert_eq!(t.hub.monitor().tracked_units(), 0);
    assert!(!t.hub.dispatcher().is_locked());
    assert_eq!(t.hub.broadcaster().subscriber_count(), 0);
    assert!(t.hub.monitor().status(None).is_online);
}
