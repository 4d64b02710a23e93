//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Debounce flags survive a restart, so an ongoing outage is not re-alerted
//! - The transition log and the delivery queue are durable
//! - History reconstruction works on top of SQLite

use std::sync::Arc;

use chrono::{Duration, Utc};
use pingwarden::{
    PingStatus,
    history::{self, HistoryPeriod},
    monitors::MonitorScheduler,
    storage::{Device, StorageBackend, sqlite::SqliteBackend},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::{ScriptedProber, create_test_monitor_config, seed_device_with_chats};

#[tokio::test]
async fn test_debounce_survives_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("pingwarden.db");

    {
        let storage = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let mut device = Device::new(1, "PLC", "192.0.2.2");
        device.monitor_ping = true;
        seed_device_with_chats(storage.as_ref(), &device, &["100"]).await;

        let scheduler = MonitorScheduler::new(
            storage.clone(),
            Arc::new(ScriptedProber::default()),
            create_test_monitor_config(),
        );
        scheduler.run_cycle_guarded().await;
        assert_eq!(storage.recent_delivery_jobs(10).await.unwrap().len(), 1);
        storage.close().await.unwrap();
    }

    let storage = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let scheduler = MonitorScheduler::new(
        storage.clone(),
        Arc::new(ScriptedProber::default()),
        create_test_monitor_config(),
    );
    scheduler.run_cycle_guarded().await;

    assert_eq!(storage.recent_delivery_jobs(10).await.unwrap().len(), 1);
    assert!(storage.get_device_alert_state(1).await.unwrap().unwrap().ping_down_sent);

    let events = storage.list_history_events(1, None, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, PingStatus::Offline);
}

#[tokio::test]
async fn test_history_reconstruction_on_sqlite() {
    let temp_dir = tempdir().unwrap();
    let storage = SqliteBackend::new(temp_dir.path().join("history.db"))
        .await
        .unwrap();
    storage
        .upsert_device(&Device::new(1, "PLC", "192.0.2.2"))
        .await
        .unwrap();

    let now = Utc::now();
    storage
        .append_history_event(1, PingStatus::Offline, now - Duration::days(3))
        .await
        .unwrap();
    storage
        .append_history_event(1, PingStatus::Online, now - Duration::hours(2))
        .await
        .unwrap();

    let window = history::reconstruct(&storage, 1, HistoryPeriod::Day, now)
        .await
        .unwrap();

    // the event from before the window carries the leading edge
    assert_eq!(window.events.len(), 2);
    assert_eq!(window.slices.len(), 2);
    assert_eq!(window.slices[0].status, PingStatus::Offline);
    assert_eq!(window.slices[0].started_at, now - Duration::hours(24));
    assert_eq!(window.slices[1].status, PingStatus::Online);
    assert_eq!(window.slices[1].ended_at, Some(now));
}
