//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{
    AppLogEntry, Bot, BotChat, DeliveryJob, Device, DeviceAlertState, MonitoredPort,
    NewAppLogEntry, NewDeliveryJob, PingHistoryEvent, PortAlertState,
};
use crate::PingStatus;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Backend-specific details (path, row counts)
    pub metadata: HashMap<String, String>,
}

/// Trait for the relational store shared by the scheduler, the delivery
/// worker and the HTTP surface
///
/// All mutation is read-modify-write at row granularity. The only
/// multi-row write that must be atomic is `insert_delivery_jobs`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between the
/// monitor task, the delivery task and request handlers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Inventory
    // ========================================================================

    /// Insert or replace a device row
    async fn upsert_device(&self, device: &Device) -> StorageResult<()>;

    async fn get_device(&self, device_id: i64) -> StorageResult<Option<Device>>;

    /// All devices, ordered by id
    async fn list_devices(&self) -> StorageResult<Vec<Device>>;

    /// Create a bot, returning its id
    async fn create_bot(&self, name: &str, token: &str) -> StorageResult<i64>;

    async fn get_bot(&self, bot_id: i64) -> StorageResult<Option<Bot>>;

    /// First bot (lowest id) carrying exactly this name
    async fn find_bot_by_name(&self, name: &str) -> StorageResult<Option<Bot>>;

    /// Add a chat destination to a bot, returning its id
    async fn add_bot_chat(&self, bot_id: i64, chat_id: &str, is_active: bool)
    -> StorageResult<i64>;

    /// Assign a bot to a device (idempotent)
    async fn assign_bot(&self, device_id: i64, bot_id: i64) -> StorageResult<()>;

    /// Bots assigned to a device
    async fn bots_for_device(&self, device_id: i64) -> StorageResult<Vec<Bot>>;

    /// Active chat destinations of the given bots, ordered by id
    async fn active_chats(&self, bot_ids: &[i64]) -> StorageResult<Vec<BotChat>>;

    // ========================================================================
    // Port list
    // ========================================================================

    /// All port rows of a device, ordered by port
    async fn list_ports(&self, device_id: i64) -> StorageResult<Vec<MonitoredPort>>;

    async fn get_port(&self, device_id: i64, port: u16) -> StorageResult<Option<MonitoredPort>>;

    /// Insert or replace a port row
    async fn upsert_port(&self, port: &MonitoredPort) -> StorageResult<()>;

    /// Returns whether a row was deleted
    async fn delete_port(&self, device_id: i64, port: u16) -> StorageResult<bool>;

    // ========================================================================
    // Transition log
    // ========================================================================

    /// Most recent event for a device
    async fn last_history_event(&self, device_id: i64) -> StorageResult<Option<PingHistoryEvent>>;

    /// Most recent event strictly before `before`
    async fn last_history_event_before(
        &self,
        device_id: i64,
        before: DateTime<Utc>,
    ) -> StorageResult<Option<PingHistoryEvent>>;

    async fn append_history_event(
        &self,
        device_id: i64,
        status: PingStatus,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<PingHistoryEvent>;

    /// Events at or after `since` (all events when `None`), oldest-first, at most `limit`
    async fn list_history_events(
        &self,
        device_id: i64,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<PingHistoryEvent>>;

    // ========================================================================
    // Debounce state
    // ========================================================================

    async fn get_device_alert_state(&self, device_id: i64)
    -> StorageResult<Option<DeviceAlertState>>;

    async fn save_device_alert_state(&self, state: &DeviceAlertState) -> StorageResult<()>;

    async fn get_port_alert_state(
        &self,
        device_id: i64,
        port: u16,
    ) -> StorageResult<Option<PortAlertState>>;

    async fn save_port_alert_state(&self, state: &PortAlertState) -> StorageResult<()>;

    /// Clear every set port flag of a device whose port is not in `keep`.
    ///
    /// Returns the number of flags cleared.
    async fn clear_port_alert_states_except(
        &self,
        device_id: i64,
        keep: &[u16],
    ) -> StorageResult<usize>;

    // ========================================================================
    // Delivery jobs
    // ========================================================================

    /// Insert all jobs atomically, returning their ids in input order
    async fn insert_delivery_jobs(&self, jobs: Vec<NewDeliveryJob>) -> StorageResult<Vec<i64>>;

    /// Ids of the jobs stamped with an idempotency key, ascending
    async fn job_ids_by_idempotency_key(&self, key: &str) -> StorageResult<Vec<i64>>;

    /// Pending or failed jobs whose next attempt is due, oldest first
    async fn due_delivery_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<DeliveryJob>>;

    /// Persist the mutable fields of a job
    async fn save_delivery_job(&self, job: &DeliveryJob) -> StorageResult<()>;

    async fn get_delivery_job(&self, id: i64) -> StorageResult<Option<DeliveryJob>>;

    /// Newest jobs first
    async fn recent_delivery_jobs(&self, limit: usize) -> StorageResult<Vec<DeliveryJob>>;

    // ========================================================================
    // Operational log
    // ========================================================================

    async fn insert_app_log(&self, entry: NewAppLogEntry) -> StorageResult<i64>;

    /// Newest entries first
    async fn recent_app_logs(&self, limit: usize) -> StorageResult<Vec<AppLogEntry>>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Performs a lightweight operation to verify the backend is operational
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
