//! Integration tests for the monitoring cycle
//!
//! These tests verify that:
//! - Alerts are edge-triggered per dimension
//! - Recovery re-arms a dimension without sending anything
//! - The transition log only records changes
//! - The actor drives the same cycle as the scheduler

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pingwarden::{
    PingStatus, PortStatus,
    actors::MonitorHandle,
    monitors::{CycleOutcome, CycleReport, MonitorScheduler},
    storage::{Device, MemoryBackend, MonitoredPort, StorageBackend},
};
use pretty_assertions::assert_eq;

use crate::helpers::{ScriptedProber, create_test_monitor_config, seed_device_with_chats};

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("unexpected cycle outcome: {other:?}"),
    }
}

async fn setup() -> (Arc<MemoryBackend>, Arc<ScriptedProber>, MonitorScheduler) {
    let storage = Arc::new(MemoryBackend::new());
    let prober = Arc::new(ScriptedProber::default());
    let scheduler =
        MonitorScheduler::new(storage.clone(), prober.clone(), create_test_monitor_config());
    (storage, prober, scheduler)
}

#[tokio::test]
async fn test_port_alert_fires_once_per_outage() {
    let (storage, prober, scheduler) = setup().await;
    let device = Device::new(1, "Router A", "192.0.2.1");
    seed_device_with_chats(storage.as_ref(), &device, &["100"]).await;

    let mut port = MonitoredPort::new(1, 8080, "TCP 8080");
    port.monitor_enabled = true;
    storage.upsert_port(&port).await.unwrap();

    let mut queued = Vec::new();
    for status in [
        PortStatus::Closed,
        PortStatus::Closed,
        PortStatus::Open,
        PortStatus::Closed,
    ] {
        prober.set_port(8080, status);
        completed(scheduler.run_cycle_guarded().await);
        queued.push(storage.recent_delivery_jobs(50).await.unwrap().len());
    }

    assert_eq!(queued, vec![1, 1, 1, 2]);

    let jobs = storage.recent_delivery_jobs(50).await.unwrap();
    assert!(jobs.iter().all(|job| job.source == "monitor"));
    assert!(
        jobs[0]
            .message
            .contains("Port fail: Router A (192.0.2.1) TCP/8080 (TCP 8080)")
    );
}

#[tokio::test]
async fn test_ping_outage_fans_out_to_every_chat() {
    let (storage, prober, scheduler) = setup().await;
    let mut device = Device::new(1, "PLC", "192.0.2.2");
    device.monitor_ping = true;
    seed_device_with_chats(storage.as_ref(), &device, &["100", "200", "100"]).await;

    prober.set_reachable(false);
    let report = completed(scheduler.run_cycle_guarded().await);
    assert_eq!(report.alerts_raised, 1);
    assert_eq!(report.jobs_queued, 2);

    let jobs = storage.recent_delivery_jobs(50).await.unwrap();
    let mut chats: Vec<_> = jobs.iter().map(|job| job.chat_id.clone()).collect();
    chats.sort();
    assert_eq!(chats, vec!["100", "200"]);
    assert!(jobs[0].message.starts_with("🚨 Ping fail: PLC (192.0.2.2)"));
}

#[tokio::test]
async fn test_transition_log_records_changes_only() {
    let (storage, prober, scheduler) = setup().await;
    let mut device = Device::new(1, "PLC", "192.0.2.2");
    device.monitor_ping = true;
    storage.upsert_device(&device).await.unwrap();

    for reachable in [true, true, false, false, true] {
        prober.set_reachable(reachable);
        completed(scheduler.run_cycle_guarded().await);
    }

    let statuses: Vec<PingStatus> = storage
        .list_history_events(1, None, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|event| event.status)
        .collect();

    assert_eq!(
        statuses,
        vec![PingStatus::Online, PingStatus::Offline, PingStatus::Online]
    );
}

#[tokio::test]
async fn test_disabled_checks_release_outstanding_flags() {
    let (storage, prober, scheduler) = setup().await;
    let mut device = Device::new(1, "PLC", "192.0.2.2");
    device.monitor_ping = true;
    seed_device_with_chats(storage.as_ref(), &device, &["100"]).await;

    prober.set_reachable(false);
    completed(scheduler.run_cycle_guarded().await);
    assert!(storage.get_device_alert_state(1).await.unwrap().unwrap().ping_down_sent);

    device.monitor_ping = false;
    storage.upsert_device(&device).await.unwrap();
    let report = completed(scheduler.run_cycle_guarded().await);
    assert_eq!(report.devices_skipped, 1);
    assert!(!storage.get_device_alert_state(1).await.unwrap().unwrap().ping_down_sent);

    // re-enabling starts armed, so the still-failing device alerts again
    device.monitor_ping = true;
    storage.upsert_device(&device).await.unwrap();
    completed(scheduler.run_cycle_guarded().await);
    assert_eq!(storage.recent_delivery_jobs(50).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_service_check_needs_capability() {
    let (storage, prober, scheduler) = setup().await;
    let mut device = Device::new(1, "Sensor", "192.0.2.3");
    device.monitor_service = true;
    device.monitor_ping = true;
    prober.set_reachable(true);
    storage.upsert_device(&device).await.unwrap();

    completed(scheduler.run_cycle_guarded().await);

    assert_eq!(prober.tcp_calls.load(Ordering::SeqCst), 0);
    let row = storage.get_device(1).await.unwrap().unwrap();
    assert_eq!(row.last_service_status, PortStatus::Disabled);
}

#[tokio::test]
async fn test_monitor_actor_run_now() {
    let (storage, prober, scheduler) = setup().await;
    let mut device = Device::new(1, "PLC", "192.0.2.2");
    device.monitor_ping = true;
    storage.upsert_device(&device).await.unwrap();
    prober.set_reachable(true);

    let handle = MonitorHandle::spawn(scheduler, Duration::from_secs(3600));
    let report = completed(handle.run_now().await.unwrap());
    assert_eq!(report.devices_checked, 1);

    let row = storage.get_device(1).await.unwrap().unwrap();
    assert_eq!(row.last_ping_status, PingStatus::Online);

    handle.shutdown().await.unwrap();
}
