//! Integration tests for outbound delivery
//!
//! These tests verify that:
//! - Queued alerts reach the messaging API with the bot's token
//! - Failed jobs are retried after their backoff and then delivered
//! - Permanent rejections keep retrying unless a dead-letter cap is set

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pingwarden::{
    config::DeliveryConfig,
    delivery::{DeliveryWorker, TableBackoff},
    monitors::MonitorScheduler,
    storage::{DeliveryStatus, Device, MemoryBackend, StorageBackend},
    telegram::TelegramMessenger,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{ScriptedProber, create_test_monitor_config, seed_device_with_chats};

fn worker(
    server: &MockServer,
    storage: Arc<MemoryBackend>,
    config: DeliveryConfig,
) -> DeliveryWorker {
    let config = DeliveryConfig {
        api_base_url: server.uri(),
        ..config
    };
    let messenger = Arc::new(
        TelegramMessenger::new(&config.api_base_url, Duration::from_secs(2)).unwrap(),
    );
    DeliveryWorker::new(storage, messenger, &config)
        .with_backoff(Arc::new(TableBackoff::new(vec![Duration::ZERO])))
}

#[tokio::test]
async fn test_alert_reaches_messaging_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bottest-token/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": "100" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryBackend::new());
    let mut device = Device::new(1, "PLC", "192.0.2.2");
    device.monitor_ping = true;
    seed_device_with_chats(storage.as_ref(), &device, &["100"]).await;

    let prober = Arc::new(ScriptedProber::default());
    let scheduler = MonitorScheduler::new(storage.clone(), prober, create_test_monitor_config());
    scheduler.run_cycle_guarded().await;

    let worker = worker(&server, storage.clone(), DeliveryConfig::default());
    let report = worker.run_batch(Utc::now()).await.unwrap();
    assert_eq!(report.sent, 1);

    let job = &storage.recent_delivery_jobs(10).await.unwrap()[0];
    assert_eq!(job.status, DeliveryStatus::Sent);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.is_none());
}

#[tokio::test]
async fn test_failed_job_is_retried_and_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryBackend::new());
    let device = Device::new(1, "PLC", "192.0.2.2");
    seed_device_with_chats(storage.as_ref(), &device, &["100"]).await;
    let fanout = pingwarden::alerts::AlertFanout::new(storage.clone());
    fanout.queue_alert(&device, "hello").await.unwrap();

    let worker = worker(&server, storage.clone(), DeliveryConfig::default());

    let first = worker.run_batch(Utc::now()).await.unwrap();
    assert_eq!(first.failed, 1);
    let job = &storage.recent_delivery_jobs(10).await.unwrap()[0];
    assert_eq!(job.status, DeliveryStatus::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("502"));

    let second = worker.run_batch(Utc::now()).await.unwrap();
    assert_eq!(second.sent, 1);
    let job = &storage.recent_delivery_jobs(10).await.unwrap()[0];
    assert_eq!(job.status, DeliveryStatus::Sent);
    assert_eq!(job.attempts, 2);
    assert!(job.last_error.is_none());
}

#[tokio::test]
async fn test_rejections_retry_until_dead_letter_cap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("chat not found"))
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryBackend::new());
    let device = Device::new(1, "PLC", "192.0.2.2");
    seed_device_with_chats(storage.as_ref(), &device, &["100"]).await;
    pingwarden::alerts::AlertFanout::new(storage.clone())
        .queue_alert(&device, "hello")
        .await
        .unwrap();

    let uncapped = worker(&server, storage.clone(), DeliveryConfig::default());
    for _ in 0..4 {
        assert_eq!(uncapped.run_batch(Utc::now()).await.unwrap().failed, 1);
    }

    let capped = worker(
        &server,
        storage.clone(),
        DeliveryConfig {
            max_attempts: Some(5),
            ..DeliveryConfig::default()
        },
    );
    assert_eq!(capped.run_batch(Utc::now()).await.unwrap().dead, 1);
    assert_eq!(capped.run_batch(Utc::now()).await.unwrap().processed(), 0);

    let job = &storage.recent_delivery_jobs(10).await.unwrap()[0];
    assert_eq!(job.status, DeliveryStatus::Dead);
    assert_eq!(job.attempts, 5);
}
