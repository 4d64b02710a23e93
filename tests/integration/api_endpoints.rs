//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - The port list endpoints enforce the catalog and delete policy
//! - History answers for known and unknown devices
//! - Inbound submissions are validated and deduplicated
//! - The log endpoint clamps its limits
//! - Error bodies carry `success: false`

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use pingwarden::{
    PingStatus, PortStatus,
    api::{ApiConfig, ApiState, spawn_api_server},
    storage::{Device, MemoryBackend, StorageBackend},
};
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::{ScriptedProber, create_test_monitor_config};

struct TestApi {
    addr: SocketAddr,
    storage: Arc<MemoryBackend>,
    client: reqwest::Client,
}

impl TestApi {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn seed_device(&self, id: i64, name: &str, address: &str) {
        self.storage
            .upsert_device(&Device::new(id, name, address))
            .await
            .unwrap();
    }
}

async fn spawn_test_api() -> TestApi {
    let storage = Arc::new(MemoryBackend::new());
    let prober = Arc::new(ScriptedProber::default());
    prober.set_port(80, PortStatus::Open);

    let state = ApiState::new(storage.clone(), prober, &create_test_monitor_config());
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };

    let addr = spawn_api_server(config, state).await.unwrap();
    TestApi {
        addr,
        storage,
        client: reqwest::Client::new(),
    }
}

fn has_port(body: &Value, port: u64) -> bool {
    body["ports"]
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item["port"] == port)
}

#[tokio::test]
async fn test_health() {
    let api = spawn_test_api().await;

    let response = api.client.get(api.url("/api/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert!(body["storage"]["message"].is_string());
}

#[tokio::test]
async fn test_scan_populates_known_ports() {
    let api = spawn_test_api().await;
    api.seed_device(1001, "Router A", "127.0.0.1").await;

    let listed: Value = api
        .client
        .get(api.url("/api/devices/1001/ports"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["success"], true);
    assert!(listed["ports"].as_array().unwrap().is_empty());

    let response = api
        .client
        .post(api.url("/api/devices/1001/ports/scan"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let scan: Value = response.json().await.unwrap();
    assert_eq!(scan["success"], true);
    assert!(scan["scannedAt"].is_string());
    assert!(scan["ports"].as_array().unwrap().len() >= 8);

    let http = scan["ports"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["port"] == 80)
        .unwrap();
    assert_eq!(http["lastStatus"], "open");
    assert_eq!(http["monitorEnabled"], false);
    assert_eq!(http["deviceId"], 1001);
}

#[tokio::test]
async fn test_closed_custom_port_is_not_persisted() {
    let api = spawn_test_api().await;
    api.seed_device(1002, "Offline Host", "203.0.113.10").await;

    let response = api
        .client
        .post(api.url("/api/devices/1002/ports/scan-custom"))
        .json(&json!({ "port": 2163 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let scan: Value = response.json().await.unwrap();
    assert_eq!(scan["success"], true);
    assert_eq!(scan["openPorts"][0]["status"], "closed");

    let listed: Value = api
        .client
        .get(api.url("/api/devices/1002/ports"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!has_port(&listed, 2163));
}

#[tokio::test]
async fn test_custom_port_toggle_and_delete_policy() {
    let api = spawn_test_api().await;
    api.seed_device(1003, "Router A", "127.0.0.1").await;
    let port_url = api.url("/api/devices/1003/ports/2163");

    let response = api
        .client
        .patch(&port_url)
        .json(&json!({ "monitorEnabled": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(
        body["ports"]
            .as_array()
            .unwrap()
            .iter()
            .any(|item| item["port"] == 2163 && item["monitorEnabled"] == true)
    );

    let response = api.client.delete(&port_url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let response = api
        .client
        .patch(&port_url)
        .json(&json!({ "monitor_enabled": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api.client.delete(&port_url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(!has_port(&body, 2163));

    let response = api
        .client
        .delete(api.url("/api/devices/1003/ports/80"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_service_port_toggle_flips_device_flag() {
    let api = spawn_test_api().await;
    api.seed_device(1004, "PLC", "127.0.0.1").await;

    let response = api
        .client
        .patch(api.url("/api/devices/1004/ports/502"))
        .json(&json!({ "monitorEnabled": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let device = api.storage.get_device(1004).await.unwrap().unwrap();
    assert!(device.monitor_service);
}

#[tokio::test]
async fn test_port_requests_for_unknown_device() {
    let api = spawn_test_api().await;

    let response = api
        .client
        .get(api.url("/api/devices/9999/ports"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api
        .client
        .patch(api.url("/api/devices/9999/ports/80"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_for_unknown_device() {
    let api = spawn_test_api().await;

    let body: Value = api
        .client
        .get(api.url("/api/devices/4242/history?period=7d"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(
        body,
        json!({
            "success": true,
            "exists": false,
            "period": "7d",
            "device": null,
            "history": [],
            "slices": [],
        })
    );
}

#[tokio::test]
async fn test_history_for_known_device() {
    let api = spawn_test_api().await;
    let mut device = Device::new(7, "PLC", "192.0.2.7");
    device.monitor_ping = true;
    api.storage.upsert_device(&device).await.unwrap();

    let now = Utc::now();
    api.storage
        .append_history_event(7, PingStatus::Online, now - Duration::hours(3))
        .await
        .unwrap();
    api.storage
        .append_history_event(7, PingStatus::Offline, now - Duration::hours(1))
        .await
        .unwrap();

    let body: Value = api
        .client
        .get(api.url("/api/devices/7/history?period=bogus"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["exists"], true);
    assert_eq!(body["period"], "24h");
    assert_eq!(body["device"]["name"], "PLC");
    assert_eq!(body["device"]["monitor_ping"], true);
    assert_eq!(body["history"].as_array().unwrap().len(), 2);
    assert_eq!(body["history"][1]["status"], "offline");
    assert!(body["history"][0]["checked_at"].is_string());

    let slices = body["slices"].as_array().unwrap();
    assert_eq!(slices.len(), 2);
    assert_eq!(slices[0]["status"], "online");
    assert!(slices[1]["ended_at"].is_string());
}

#[tokio::test]
async fn test_inbound_flow() {
    let api = spawn_test_api().await;
    let bot = api.storage.create_bot("backup-bot", "test-token").await.unwrap();
    api.storage.add_bot_chat(bot, "100", true).await.unwrap();
    api.storage.add_bot_chat(bot, "200", false).await.unwrap();

    let url = api.url("/api/inbound/messages");
    let payload = json!({
        "bot_name": "backup-bot",
        "text": "nightly backup done",
        "source": "Backup",
        "idempotency_key": "backup-2024-01-01",
    });

    let response = api.client.post(&url).json(&payload).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let first: Value = response.json().await.unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["bot_name"], "backup-bot");
    assert_eq!(first["queued"], 1);
    assert_eq!(first["deduplicated"], false);

    let response = api.client.post(&url).json(&payload).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let second: Value = response.json().await.unwrap();
    assert_eq!(second["queued"], 0);
    assert_eq!(second["deduplicated"], true);
    assert_eq!(second["notification_ids"], first["notification_ids"]);

    let response = api
        .client
        .post(&url)
        .json(&json!({ "bot_name": "backup-bot", "idempotency_key": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "text is required");

    let response = api
        .client
        .post(&url)
        .json(&json!({
            "bot_name": "backup-bot",
            "chat_id": "200",
            "text": "hi",
            "idempotency_key": "y",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api
        .client
        .post(&url)
        .json(&json!({ "bot_name": "nobody", "text": "hi", "idempotency_key": "z" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logs_endpoint() {
    let api = spawn_test_api().await;
    let bot = api.storage.create_bot("ops", "secret-token").await.unwrap();
    api.storage.add_bot_chat(bot, "100", true).await.unwrap();

    for key in ["a", "b", "c"] {
        api.client
            .post(api.url("/api/inbound/messages"))
            .json(&json!({ "bot_name": "ops", "text": key, "idempotency_key": key }))
            .send()
            .await
            .unwrap();
    }

    let body: Value = api
        .client
        .get(api.url("/api/logs?limit=2&app_limit=0"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["message"], "c");
    assert_eq!(logs[0]["status"], "pending");
    assert_eq!(logs[0]["source"], "rest");
    assert!(logs[0].get("token").is_none());
    assert!(body["app_logs"].is_array());
}
