//! Integration tests for API endpoints
//!
//! Each test binds a real server on a random local port and talks to it over HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;
use tanker_watch::api::{ApiState, spawn_api_server};
use tanker_watch::events::BroadcastEvent;

use crate::helpers::{TestHub, test_hub};

async fn spawn_test_api(t: &TestHub) -> SocketAddr {
    spawn_api_server(&t.hub.config().api, ApiState::new(t.hub.clone()))
        .await
        .unwrap()
}

async fn get_json(addr: SocketAddr, route: &str) -> (StatusCode, Value) {
    let response = reqwest::get(format!("http://{addr}{route}")).await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.json().await.unwrap())
}

async fn post_json(addr: SocketAddr, route: &str) -> Value {
    reqwest::Client::new()
        .post(format!("http://{addr}{route}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Read from an SSE response until the buffer contains `needle`.
async fn read_until(response: &mut reqwest::Response, buffer: &mut String, needle: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !buffer.contains(needle) {
            let chunk = response.chunk().await.unwrap().expect("stream ended");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}, got {buffer:?}"));
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let t = test_hub(None);
    let addr = spawn_test_api(&t).await;

    let (status, json) = get_json(addr, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
    assert_eq!(json["mqttConnected"], false);
}

#[tokio::test]
async fn test_tamper_status_aggregate_and_single_unit() {
    let t = test_hub(None);
    let addr = spawn_test_api(&t).await;

    let (_, json) = get_json(addr, "/api/tamper-status").await;
    assert_eq!(json["success"], true);
    assert_eq!(json["isOnline"], true);
    assert_eq!(json["offlineDuration"], 0);

    t.hub.ingress().handle_message("T001/distance", b"10").unwrap();
    t.clock.advance_ms(61_000);
    t.hub.monitor().sweep().outcomes().await;

    let (_, json) = get_json(addr, "/api/tamper-status").await;
    assert_eq!(json["isOnline"], false);
    assert_eq!(json["alertSent"], true);
    assert_eq!(json["offlineDuration"], 61_000);

    let (_, json) = get_json(addr, "/api/tamper-status?tankerId=T001").await;
    assert_eq!(json["isOnline"], false);
    assert_eq!(json["lastDataTime"], 0);

    // never-seen units are reported online
    let (_, json) = get_json(addr, "/api/tamper-status?tankerId=T404").await;
    assert_eq!(json["isOnline"], true);
    assert_eq!(json["alertSent"], false);

    let (_, json) = get_json(addr, "/api/tamper-status/units").await;
    assert_eq!(json["units"]["T001"]["isOnline"], false);
    assert!(json["units"].get("T404").is_none());
}

#[tokio::test]
async fn test_test_alert_lock_and_reset() {
    let t = test_hub(Some("ops@example.com"));
    let addr = spawn_test_api(&t).await;

    let json = post_json(addr, "/api/send-test-alert").await;
    assert_eq!(json["success"], true);
    assert_eq!(json["outcome"], "sent");

    let json = post_json(addr, "/api/send-test-alert").await;
    assert_eq!(json["success"], false);
    assert_eq!(json["outcome"], "suppressed");

    let json = post_json(addr, "/api/alerts/reset").await;
    assert_eq!(json["wasLocked"], true);

    let (_, json) = get_json(addr, "/api/email-logs").await;
    let logs = json["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["status"], "suppressed");
    assert_eq!(logs[1]["status"], "sent");
    assert_eq!(logs[1]["to"], "ops@example.com");
    assert_eq!(logs[1]["subject"], "SWAT TAMPER ALERT - Communication Lost");
    assert_eq!(logs[1]["alert"]["lastKnownLat"], 19.077);
    assert_eq!(logs[1]["alert"]["offlineDuration"], 120_000);
}

#[tokio::test]
async fn test_snapshot_endpoint() {
    let t = test_hub(None);
    let addr = spawn_test_api(&t).await;

    t.hub.ingress().handle_message("T002/gps", br#"{"lat":3,"lon":4}"#).unwrap();
    t.hub.ingress().handle_message("T001/distance", b"80").unwrap();

    let (_, json) = get_json(addr, "/api/snapshot").await;
    assert_eq!(json["connected"], false);
    assert_eq!(json["tankers"][0]["id"], "T002");
    assert_eq!(json["tankers"][0]["lat"], 3.0);
    assert_eq!(json["tankers"][1]["id"], "T001");
    assert!(json["tankers"][1].get("lat").is_none());
}

#[tokio::test]
async fn test_stream_sends_ready_snapshot_and_live_events() {
    let t = test_hub(None);
    let addr = spawn_test_api(&t).await;
    t.hub.ingress().handle_message("T001/distance", b"25").unwrap();

    let mut response = reqwest::get(format!("http://{addr}/api/stream")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(t.hub.broadcaster().subscriber_count(), 1);

    let mut buffer = String::new();
    read_until(&mut response, &mut buffer, r#""type":"snapshot""#).await;
    let ready = buffer.find(r#""type":"ready""#).unwrap();
    let snapshot = buffer.find(r#""type":"snapshot""#).unwrap();
    assert!(ready < snapshot);

    t.hub.ingress().handle_message("T001/gps", br#"{"lat":19.0,"lon":72.9}"#).unwrap();
    read_until(&mut response, &mut buffer, r#""type":"mqtt""#).await;
    assert!(buffer.contains(r#""topic":"T001/gps""#));

    drop(response);

    // the subscription goes away with the client; publishing makes the server notice
    tokio::time::timeout(Duration::from_secs(5), async {
        while t.hub.broadcaster().subscriber_count() > 0 {
            t.hub.broadcaster().publish(&BroadcastEvent::Ready);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("subscription was not removed after disconnect");
}

#[tokio::test]
async fn test_stream_without_units_skips_snapshot() {
    let t = test_hub(None);
    let addr = spawn_test_api(&t).await;

    let mut response = reqwest::get(format!("http://{addr}/api/stream")).await.unwrap();
    let mut buffer = String::new();
    read_until(&mut response, &mut buffer, r#""type":"ready""#).await;

    t.hub.ingress().handle_message("T001/distance", b"1").unwrap();
    read_until(&mut response, &mut buffer, r#""type":"mqtt""#).await;
    assert!(!buffer.contains("snapshot"));
}
