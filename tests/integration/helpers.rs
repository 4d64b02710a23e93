//! Helper functions for integration tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use pingwarden::{
    PingStatus, PortStatus,
    config::MonitorConfig,
    monitors::Prober,
    storage::{Device, StorageBackend},
};

/// Prober whose answers are set by the test
#[derive(Default)]
pub struct ScriptedProber {
    reachable: AtomicBool,
    ports: Mutex<HashMap<u16, PortStatus>>,
    pub tcp_calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_port(&self, port: u16, status: PortStatus) {
        self.ports.lock().unwrap().insert(port, status);
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn reachability(&self, _address: &str) -> PingStatus {
        if self.reachable.load(Ordering::SeqCst) {
            PingStatus::Online
        } else {
            PingStatus::Offline
        }
    }

    async fn tcp(&self, _address: &str, port: u16) -> PortStatus {
        self.tcp_calls.fetch_add(1, Ordering::SeqCst);
        self.ports
            .lock()
            .unwrap()
            .get(&port)
            .copied()
            .unwrap_or(PortStatus::Closed)
    }
}

/// Monitor configuration without retry delays
pub fn create_test_monitor_config() -> MonitorConfig {
    MonitorConfig {
        retry_delays_secs: vec![0, 0, 0],
        ..MonitorConfig::default()
    }
}

/// Insert a device assigned to a bot with the given active chats.
///
/// Returns the bot id.
pub async fn seed_device_with_chats(
    storage: &dyn StorageBackend,
    device: &Device,
    chats: &[&str],
) -> i64 {
    storage.upsert_device(device).await.unwrap();

    let bot_id = storage
        .create_bot(&format!("bot-{}", device.id), "test-token")
        .await
        .unwrap();
    for chat in chats {
        storage.add_bot_chat(bot_id, chat, true).await.unwrap();
    }
    storage.assign_bot(device.id, bot_id).await.unwrap();

    bot_id
}
