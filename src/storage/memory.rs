//! In-memory storage backend (no persistence)
//!
//! This backend keeps every table in memory behind a single lock.
//! It's useful for:
//! - Testing without database dependencies
//! - Throwaway deployments (`"backend": "none"`)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: Delivery jobs and logs are never evicted

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AppLogEntry, Bot, BotChat, DeliveryJob, DeliveryStatus, Device, DeviceAlertState,
    MonitoredPort, NewAppLogEntry, NewDeliveryJob, PingHistoryEvent, PortAlertState,
};
use crate::PingStatus;

#[derive(Default)]
struct Tables {
    devices: BTreeMap<i64, Device>,
    bots: Vec<Bot>,
    chats: Vec<BotChat>,
    assignments: BTreeSet<(i64, i64)>,
    ports: BTreeMap<(i64, u16), MonitoredPort>,
    history: Vec<PingHistoryEvent>,
    device_alerts: HashMap<i64, DeviceAlertState>,
    port_alerts: BTreeMap<(i64, u16), PortAlertState>,
    jobs: Vec<DeliveryJob>,
    logs: Vec<AppLogEntry>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    /// Events of a device in (checked_at, id) order
    fn device_history(&self, device_id: i64) -> Vec<&PingHistoryEvent> {
        let mut events: Vec<_> = self
            .history
            .iter()
            .filter(|event| event.device_id == device_id)
            .collect();
        events.sort_by_key(|event| (event.checked_at, event.id));
        events
    }
}

/// In-memory storage backend
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

#[cfg(test)]
impl MemoryBackend {
    pub(crate) async fn remove_device(&self, device_id: i64) {
        self.tables.write().await.devices.remove(&device_id);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upsert_device(&self, device: &Device) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .devices
            .insert(device.id, device.clone());
        Ok(())
    }

    async fn get_device(&self, device_id: i64) -> StorageResult<Option<Device>> {
        Ok(self.tables.read().await.devices.get(&device_id).cloned())
    }

    async fn list_devices(&self) -> StorageResult<Vec<Device>> {
        Ok(self.tables.read().await.devices.values().cloned().collect())
    }

    async fn create_bot(&self, name: &str, token: &str) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.bots.push(Bot {
            id,
            name: name.to_string(),
            token: token.to_string(),
        });
        Ok(id)
    }

    async fn get_bot(&self, bot_id: i64) -> StorageResult<Option<Bot>> {
        Ok(self
            .tables
            .read()
            .await
            .bots
            .iter()
            .find(|bot| bot.id == bot_id)
            .cloned())
    }

    async fn find_bot_by_name(&self, name: &str) -> StorageResult<Option<Bot>> {
        Ok(self
            .tables
            .read()
            .await
            .bots
            .iter()
            .find(|bot| bot.name == name)
            .cloned())
    }

    async fn add_bot_chat(
        &self,
        bot_id: i64,
        chat_id: &str,
        is_active: bool,
    ) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.chats.push(BotChat {
            id,
            bot_id,
            chat_id: chat_id.to_string(),
            is_active,
        });
        Ok(id)
    }

    async fn assign_bot(&self, device_id: i64, bot_id: i64) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .assignments
            .insert((device_id, bot_id));
        Ok(())
    }

    async fn bots_for_device(&self, device_id: i64) -> StorageResult<Vec<Bot>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bots
            .iter()
            .filter(|bot| tables.assignments.contains(&(device_id, bot.id)))
            .cloned()
            .collect())
    }

    async fn active_chats(&self, bot_ids: &[i64]) -> StorageResult<Vec<BotChat>> {
        Ok(self
            .tables
            .read()
            .await
            .chats
            .iter()
            .filter(|chat| chat.is_active && bot_ids.contains(&chat.bot_id))
            .cloned()
            .collect())
    }

    async fn list_ports(&self, device_id: i64) -> StorageResult<Vec<MonitoredPort>> {
        Ok(self
            .tables
            .read()
            .await
            .ports
            .range((device_id, u16::MIN)..=(device_id, u16::MAX))
            .map(|(_, port)| port.clone())
            .collect())
    }

    async fn get_port(&self, device_id: i64, port: u16) -> StorageResult<Option<MonitoredPort>> {
        Ok(self
            .tables
            .read()
            .await
            .ports
            .get(&(device_id, port))
            .cloned())
    }

    async fn upsert_port(&self, port: &MonitoredPort) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .ports
            .insert((port.device_id, port.port), port.clone());
        Ok(())
    }

    async fn delete_port(&self, device_id: i64, port: u16) -> StorageResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .ports
            .remove(&(device_id, port))
            .is_some())
    }

    async fn last_history_event(&self, device_id: i64) -> StorageResult<Option<PingHistoryEvent>> {
        let tables = self.tables.read().await;
        Ok(tables.device_history(device_id).last().map(|e| (*e).clone()))
    }

    async fn last_history_event_before(
        &self,
        device_id: i64,
        before: DateTime<Utc>,
    ) -> StorageResult<Option<PingHistoryEvent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .device_history(device_id)
            .into_iter()
            .filter(|event| event.checked_at < before)
            .next_back()
            .cloned())
    }

    async fn append_history_event(
        &self,
        device_id: i64,
        status: PingStatus,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<PingHistoryEvent> {
        let mut tables = self.tables.write().await;
        let event = PingHistoryEvent {
            id: tables.next_id(),
            device_id,
            status,
            checked_at,
        };
        tables.history.push(event.clone());
        Ok(event)
    }

    async fn list_history_events(
        &self,
        device_id: i64,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<PingHistoryEvent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .device_history(device_id)
            .into_iter()
            .filter(|event| since.is_none_or(|since| event.checked_at >= since))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_device_alert_state(
        &self,
        device_id: i64,
    ) -> StorageResult<Option<DeviceAlertState>> {
        Ok(self
            .tables
            .read()
            .await
            .device_alerts
            .get(&device_id)
            .cloned())
    }

    async fn save_device_alert_state(&self, state: &DeviceAlertState) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .device_alerts
            .insert(state.device_id, state.clone());
        Ok(())
    }

    async fn get_port_alert_state(
        &self,
        device_id: i64,
        port: u16,
    ) -> StorageResult<Option<PortAlertState>> {
        Ok(self
            .tables
            .read()
            .await
            .port_alerts
            .get(&(device_id, port))
            .cloned())
    }

    async fn save_port_alert_state(&self, state: &PortAlertState) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .port_alerts
            .insert((state.device_id, state.port), state.clone());
        Ok(())
    }

    async fn clear_port_alert_states_except(
        &self,
        device_id: i64,
        keep: &[u16],
    ) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let mut cleared = 0;
        for state in tables.port_alerts.values_mut() {
            if state.device_id == device_id && state.down_sent && !keep.contains(&state.port) {
                state.down_sent = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn insert_delivery_jobs(&self, jobs: Vec<NewDeliveryJob>) -> StorageResult<Vec<i64>> {
        let created_at = Utc::now();
        let mut tables = self.tables.write().await;
        let mut ids = Vec::with_capacity(jobs.len());

        for job in jobs {
            let id = tables.next_id();
            tables.jobs.push(DeliveryJob {
                id,
                bot_id: job.bot_id,
                token: job.token,
                chat_id: job.chat_id,
                message: job.message,
                status: DeliveryStatus::Pending,
                attempts: 0,
                last_error: None,
                next_attempt_at: None,
                created_at,
                sent_at: None,
                idempotency_key: job.idempotency_key,
                source: job.source,
            });
            ids.push(id);
        }

        debug!("queued {} delivery jobs in memory", ids.len());
        Ok(ids)
    }

    async fn job_ids_by_idempotency_key(&self, key: &str) -> StorageResult<Vec<i64>> {
        Ok(self
            .tables
            .read()
            .await
            .jobs
            .iter()
            .filter(|job| job.idempotency_key.as_deref() == Some(key))
            .map(|job| job.id)
            .collect())
    }

    async fn due_delivery_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<DeliveryJob>> {
        Ok(self
            .tables
            .read()
            .await
            .jobs
            .iter()
            .filter(|job| job.status.is_deliverable())
            .filter(|job| job.next_attempt_at.is_none_or(|at| at <= now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_delivery_job(&self, job: &DeliveryJob) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .jobs
            .iter_mut()
            .find(|stored| stored.id == job.id)
            .ok_or_else(|| StorageError::NotFound(format!("delivery job {}", job.id)))?;

        stored.status = job.status;
        stored.attempts = job.attempts;
        stored.last_error = job.last_error.clone();
        stored.next_attempt_at = job.next_attempt_at;
        stored.sent_at = job.sent_at;
        Ok(())
    }

    async fn get_delivery_job(&self, id: i64) -> StorageResult<Option<DeliveryJob>> {
        Ok(self
            .tables
            .read()
            .await
            .jobs
            .iter()
            .find(|job| job.id == id)
            .cloned())
    }

    async fn recent_delivery_jobs(&self, limit: usize) -> StorageResult<Vec<DeliveryJob>> {
        Ok(self
            .tables
            .read()
            .await
            .jobs
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_app_log(&self, entry: NewAppLogEntry) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.logs.push(AppLogEntry {
            id,
            level: entry.level,
            scope: entry.scope,
            message: entry.message,
            details: entry.details,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn recent_app_logs(&self, limit: usize) -> StorageResult<Vec<AppLogEntry>> {
        Ok(self
            .tables
            .read()
            .await
            .logs
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let tables = self.tables.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("devices".to_string(), tables.devices.len().to_string()),
                ("delivery_jobs".to_string(), tables.jobs.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
