//! Integration tests for inbound submissions
//!
//! These tests verify that:
//! - An idempotency key queues jobs at most once, even under concurrency
//! - Source tags and prefixes end up on the queued jobs

use std::sync::Arc;

use assert_matches::assert_matches;
use pingwarden::{
    inbound::{InboundError, InboundGateway, InboundMessage},
    storage::{MemoryBackend, StorageBackend},
};

async fn gateway() -> (Arc<MemoryBackend>, InboundGateway) {
    let storage = Arc::new(MemoryBackend::new());
    let bot = storage.create_bot("backup-bot", "test-token").await.unwrap();
    storage.add_bot_chat(bot, "100", true).await.unwrap();
    storage.add_bot_chat(bot, "200", true).await.unwrap();
    (storage.clone(), InboundGateway::new(storage))
}

fn message(key: &str) -> InboundMessage {
    InboundMessage {
        bot_name: Some("backup-bot".to_string()),
        text: Some("nightly backup done".to_string()),
        source: Some("Backup".to_string()),
        idempotency_key: Some(key.to_string()),
        ..InboundMessage::default()
    }
}

#[tokio::test]
async fn test_concurrent_submissions_queue_once() {
    let (storage, gateway) = gateway().await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let gateway = gateway.clone();
        tasks.push(tokio::spawn(async move {
            gateway.submit(message("run-2024-01-01")).await
        }));
    }

    let mut fresh = 0;
    let mut ids = Vec::new();
    for task in tasks {
        let receipt = task.await.unwrap().unwrap();
        if !receipt.deduplicated {
            fresh += 1;
        }
        ids.push(receipt.notification_ids);
    }

    assert_eq!(fresh, 1);
    assert!(ids.windows(2).all(|pair| {
        let mut a = pair[0].clone();
        let mut b = pair[1].clone();
        a.sort();
        b.sort();
        a == b
    }));
    assert_eq!(storage.recent_delivery_jobs(50).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_jobs_carry_source_and_key() {
    let (storage, gateway) = gateway().await;
    gateway.submit(message("k-1")).await.unwrap();

    let jobs = storage.recent_delivery_jobs(50).await.unwrap();
    assert!(jobs.iter().all(|job| job.source == "rest:backup"));
    assert!(jobs.iter().all(|job| job.message == "[Backup] nightly backup done"));
    assert!(jobs.iter().all(|job| job.idempotency_key.as_deref() == Some("k-1")));
}

#[tokio::test]
async fn test_missing_fields_write_nothing() {
    let (storage, gateway) = gateway().await;

    let mut msg = message("k-2");
    msg.text = None;
    assert_matches!(gateway.submit(msg).await, Err(InboundError::Invalid(_)));

    assert!(storage.recent_delivery_jobs(50).await.unwrap().is_empty());
}
