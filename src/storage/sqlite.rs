//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (HTTP handlers) are not blocked by the monitor writing
//! - **Connection pooling**: Small pool shared by all tasks
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds, statuses as their lowercase names.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AppLogEntry, Bot, BotChat, DeliveryJob, Device, DeviceAlertState, MonitoredPort,
    NewAppLogEntry, NewDeliveryJob, PingHistoryEvent, PortAlertState,
};
use crate::PingStatus;

const DELIVERY_JOB_COLUMNS: &str = "id, bot_id, token, chat_id, message, status, attempts, \
     last_error, next_attempt_at, created_at, sent_at, idempotency_key, source";

const DEVICE_COLUMNS: &str = "id, name, address, supports_service, monitor_ping, \
     monitor_service, last_ping_status, last_service_status, last_seen_at";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use pingwarden::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./pingwarden.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        info!("SQLite connection pool created");

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn optional_timestamp(row: &SqliteRow, column: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let millis: Option<i64> = row.try_get(column)?;
        Ok(millis.map(Self::millis_to_timestamp))
    }

    fn parse_column<T>(row: &SqliteRow, column: &str) -> StorageResult<T>
    where
        T: std::str::FromStr<Err = String>,
    {
        let raw: String = row.try_get(column)?;
        raw.parse::<T>()
            .map_err(|e| StorageError::SerializationError(format!("{column}: {e}")))
    }

    fn port_from_row(row: &SqliteRow, column: &str) -> StorageResult<u16> {
        let raw: i64 = row.try_get(column)?;
        u16::try_from(raw)
            .map_err(|_| StorageError::SerializationError(format!("{column}: {raw} out of range")))
    }

    fn device_from_row(row: &SqliteRow) -> StorageResult<Device> {
        Ok(Device {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            supports_service: row.try_get("supports_service")?,
            monitor_ping: row.try_get("monitor_ping")?,
            monitor_service: row.try_get("monitor_service")?,
            last_ping_status: Self::parse_column(row, "last_ping_status")?,
            last_service_status: Self::parse_column(row, "last_service_status")?,
            last_seen_at: Self::optional_timestamp(row, "last_seen_at")?,
        })
    }

    fn port_row_from_row(row: &SqliteRow) -> StorageResult<MonitoredPort> {
        Ok(MonitoredPort {
            device_id: row.try_get("device_id")?,
            port: Self::port_from_row(row, "port")?,
            label: row.try_get("label")?,
            monitor_enabled: row.try_get("monitor_enabled")?,
            last_status: Self::parse_column(row, "last_status")?,
            last_scanned_at: Self::optional_timestamp(row, "last_scanned_at")?,
        })
    }

    fn history_from_row(row: &SqliteRow) -> StorageResult<PingHistoryEvent> {
        Ok(PingHistoryEvent {
            id: row.try_get("id")?,
            device_id: row.try_get("device_id")?,
            status: Self::parse_column(row, "status")?,
            checked_at: Self::millis_to_timestamp(row.try_get("checked_at")?),
        })
    }

    fn bot_from_row(row: &SqliteRow) -> StorageResult<Bot> {
        Ok(Bot {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            token: row.try_get("token")?,
        })
    }

    fn job_from_row(row: &SqliteRow) -> StorageResult<DeliveryJob> {
        let attempts: i64 = row.try_get("attempts")?;
        Ok(DeliveryJob {
            id: row.try_get("id")?,
            bot_id: row.try_get("bot_id")?,
            token: row.try_get("token")?,
            chat_id: row.try_get("chat_id")?,
            message: row.try_get("message")?,
            status: Self::parse_column(row, "status")?,
            attempts: attempts.max(0) as u32,
            last_error: row.try_get("last_error")?,
            next_attempt_at: Self::optional_timestamp(row, "next_attempt_at")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            sent_at: Self::optional_timestamp(row, "sent_at")?,
            idempotency_key: row.try_get("idempotency_key")?,
            source: row.try_get("source")?,
        })
    }

    fn log_from_row(row: &SqliteRow) -> StorageResult<AppLogEntry> {
        Ok(AppLogEntry {
            id: row.try_get("id")?,
            level: Self::parse_column(row, "level")?,
            scope: row.try_get("scope")?,
            message: row.try_get("message")?,
            details: row.try_get("details")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, device), fields(device_id = device.id))]
    async fn upsert_device(&self, device: &Device) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO devices (
                id, name, address, supports_service, monitor_ping, monitor_service,
                last_ping_status, last_service_status, last_seen_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                supports_service = excluded.supports_service,
                monitor_ping = excluded.monitor_ping,
                monitor_service = excluded.monitor_service,
                last_ping_status = excluded.last_ping_status,
                last_service_status = excluded.last_service_status,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(device.id)
        .bind(&device.name)
        .bind(&device.address)
        .bind(device.supports_service)
        .bind(device.monitor_ping)
        .bind(device.monitor_service)
        .bind(device.last_ping_status.as_str())
        .bind(device.last_service_status.as_str())
        .bind(device.last_seen_at.as_ref().map(Self::timestamp_to_millis))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_device(&self, device_id: i64) -> StorageResult<Option<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::device_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_devices(&self) -> StorageResult<Vec<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::device_from_row).collect()
    }

    #[instrument(skip(self, token))]
    async fn create_bot(&self, name: &str, token: &str) -> StorageResult<i64> {
        let result = sqlx::query("INSERT INTO bots (name, token) VALUES (?, ?)")
            .bind(name)
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn get_bot(&self, bot_id: i64) -> StorageResult<Option<Bot>> {
        let row = sqlx::query("SELECT id, name, token FROM bots WHERE id = ?")
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::bot_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn find_bot_by_name(&self, name: &str) -> StorageResult<Option<Bot>> {
        let row = sqlx::query("SELECT id, name, token FROM bots WHERE name = ? ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::bot_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn add_bot_chat(
        &self,
        bot_id: i64,
        chat_id: &str,
        is_active: bool,
    ) -> StorageResult<i64> {
        let result =
            sqlx::query("INSERT INTO bot_chats (bot_id, chat_id, is_active) VALUES (?, ?, ?)")
                .bind(bot_id)
                .bind(chat_id)
                .bind(is_active)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn assign_bot(&self, device_id: i64, bot_id: i64) -> StorageResult<()> {
        sqlx::query("INSERT OR IGNORE INTO device_bots (device_id, bot_id) VALUES (?, ?)")
            .bind(device_id)
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn bots_for_device(&self, device_id: i64) -> StorageResult<Vec<Bot>> {
        let rows = sqlx::query(
            r#"
            SELECT b.id, b.name, b.token
            FROM bots b
            JOIN device_bots db ON db.bot_id = b.id
            WHERE db.device_id = ?
            ORDER BY b.id ASC
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::bot_from_row).collect()
    }

    #[instrument(skip(self), fields(bots = bot_ids.len()))]
    async fn active_chats(&self, bot_ids: &[i64]) -> StorageResult<Vec<BotChat>> {
        if bot_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, bot_id, chat_id, is_active FROM bot_chats \
             WHERE is_active = 1 AND bot_id IN ({}) ORDER BY id ASC",
            Self::placeholders(bot_ids.len())
        );

        let mut query = sqlx::query(&sql);
        for bot_id in bot_ids {
            query = query.bind(*bot_id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter()
            .map(|row| -> StorageResult<BotChat> {
                Ok(BotChat {
                    id: row.try_get("id")?,
                    bot_id: row.try_get("bot_id")?,
                    chat_id: row.try_get("chat_id")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn list_ports(&self, device_id: i64) -> StorageResult<Vec<MonitoredPort>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, port, label, monitor_enabled, last_status, last_scanned_at
            FROM device_ports
            WHERE device_id = ?
            ORDER BY port ASC
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::port_row_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn get_port(&self, device_id: i64, port: u16) -> StorageResult<Option<MonitoredPort>> {
        let row = sqlx::query(
            r#"
            SELECT device_id, port, label, monitor_enabled, last_status, last_scanned_at
            FROM device_ports
            WHERE device_id = ? AND port = ?
            "#,
        )
        .bind(device_id)
        .bind(i64::from(port))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::port_row_from_row).transpose()
    }

    #[instrument(skip(self, port), fields(device_id = port.device_id, port = port.port))]
    async fn upsert_port(&self, port: &MonitoredPort) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_ports (
                device_id, port, label, monitor_enabled, last_status, last_scanned_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (device_id, port) DO UPDATE SET
                label = excluded.label,
                monitor_enabled = excluded.monitor_enabled,
                last_status = excluded.last_status,
                last_scanned_at = excluded.last_scanned_at
            "#,
        )
        .bind(port.device_id)
        .bind(i64::from(port.port))
        .bind(&port.label)
        .bind(port.monitor_enabled)
        .bind(port.last_status.as_str())
        .bind(port.last_scanned_at.as_ref().map(Self::timestamp_to_millis))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_port(&self, device_id: i64, port: u16) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM device_ports WHERE device_id = ? AND port = ?")
            .bind(device_id)
            .bind(i64::from(port))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn last_history_event(&self, device_id: i64) -> StorageResult<Option<PingHistoryEvent>> {
        let row = sqlx::query(
            r#"
            SELECT id, device_id, status, checked_at
            FROM device_ping_history
            WHERE device_id = ?
            ORDER BY checked_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::history_from_row).transpose()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn last_history_event_before(
        &self,
        device_id: i64,
        before: DateTime<Utc>,
    ) -> StorageResult<Option<PingHistoryEvent>> {
        let row = sqlx::query(
            r#"
            SELECT id, device_id, status, checked_at
            FROM device_ping_history
            WHERE device_id = ? AND checked_at < ?
            ORDER BY checked_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .bind(Self::timestamp_to_millis(&before))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::history_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn append_history_event(
        &self,
        device_id: i64,
        status: PingStatus,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<PingHistoryEvent> {
        let result =
            sqlx::query("INSERT INTO device_ping_history (device_id, status, checked_at) VALUES (?, ?, ?)")
                .bind(device_id)
                .bind(status.as_str())
                .bind(Self::timestamp_to_millis(&checked_at))
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(PingHistoryEvent {
            id: result.last_insert_rowid(),
            device_id,
            status,
            checked_at,
        })
    }

    #[instrument(skip(self))]
    async fn list_history_events(
        &self,
        device_id: i64,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<PingHistoryEvent>> {
        let since_millis = since.as_ref().map(Self::timestamp_to_millis).unwrap_or(i64::MIN);

        let rows = sqlx::query(
            r#"
            SELECT id, device_id, status, checked_at
            FROM device_ping_history
            WHERE device_id = ? AND checked_at >= ?
            ORDER BY checked_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(device_id)
        .bind(since_millis)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::history_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn get_device_alert_state(
        &self,
        device_id: i64,
    ) -> StorageResult<Option<DeviceAlertState>> {
        let row = sqlx::query(
            "SELECT device_id, ping_down_sent, service_down_sent FROM device_alert_state WHERE device_id = ?",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.map(|row| -> StorageResult<DeviceAlertState> {
            Ok(DeviceAlertState {
                device_id: row.try_get("device_id")?,
                ping_down_sent: row.try_get("ping_down_sent")?,
                service_down_sent: row.try_get("service_down_sent")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, state), fields(device_id = state.device_id))]
    async fn save_device_alert_state(&self, state: &DeviceAlertState) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_alert_state (device_id, ping_down_sent, service_down_sent, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (device_id) DO UPDATE SET
                ping_down_sent = excluded.ping_down_sent,
                service_down_sent = excluded.service_down_sent,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.device_id)
        .bind(state.ping_down_sent)
        .bind(state.service_down_sent)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_port_alert_state(
        &self,
        device_id: i64,
        port: u16,
    ) -> StorageResult<Option<PortAlertState>> {
        let row = sqlx::query(
            "SELECT device_id, port, down_sent FROM port_alert_state WHERE device_id = ? AND port = ?",
        )
        .bind(device_id)
        .bind(i64::from(port))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.map(|row| -> StorageResult<PortAlertState> {
            Ok(PortAlertState {
                device_id: row.try_get("device_id")?,
                port: Self::port_from_row(&row, "port")?,
                down_sent: row.try_get("down_sent")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, state), fields(device_id = state.device_id, port = state.port))]
    async fn save_port_alert_state(&self, state: &PortAlertState) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO port_alert_state (device_id, port, down_sent, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (device_id, port) DO UPDATE SET
                down_sent = excluded.down_sent,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.device_id)
        .bind(i64::from(state.port))
        .bind(state.down_sent)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    async fn clear_port_alert_states_except(
        &self,
        device_id: i64,
        keep: &[u16],
    ) -> StorageResult<usize> {
        let rows = sqlx::query(
            "SELECT port FROM port_alert_state WHERE device_id = ? AND down_sent = 1",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let mut cleared = 0;
        for row in rows {
            let port = Self::port_from_row(&row, "port")?;
            if keep.contains(&port) {
                continue;
            }

            sqlx::query(
                "UPDATE port_alert_state SET down_sent = 0, updated_at = ? WHERE device_id = ? AND port = ?",
            )
            .bind(Self::timestamp_to_millis(&Utc::now()))
            .bind(device_id)
            .bind(i64::from(port))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
            cleared += 1;
        }

        Ok(cleared)
    }

    #[instrument(skip(self, jobs), fields(count = jobs.len()))]
    async fn insert_delivery_jobs(&self, jobs: Vec<NewDeliveryJob>) -> StorageResult<Vec<i64>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let created_at = Self::timestamp_to_millis(&Utc::now());

        // Use a transaction so a fan-out is never half-queued
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            let result = sqlx::query(
                r#"
                INSERT INTO delivery_jobs (
                    bot_id, token, chat_id, message, status, attempts,
                    created_at, idempotency_key, source
                )
                VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?)
                "#,
            )
            .bind(job.bot_id)
            .bind(&job.token)
            .bind(&job.chat_id)
            .bind(&job.message)
            .bind(created_at)
            .bind(&job.idempotency_key)
            .bind(&job.source)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

            ids.push(result.last_insert_rowid());
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        debug!("queued {} delivery jobs", ids.len());
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn job_ids_by_idempotency_key(&self, key: &str) -> StorageResult<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM delivery_jobs WHERE idempotency_key = ? ORDER BY id ASC")
                .bind(key)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    #[instrument(skip(self), fields(now = %now))]
    async fn due_delivery_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<DeliveryJob>> {
        let sql = format!(
            r#"
            SELECT {DELIVERY_JOB_COLUMNS}
            FROM delivery_jobs
            WHERE status IN ('pending', 'failed')
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
            ORDER BY id ASC
            LIMIT ?
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(Self::timestamp_to_millis(&now))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::job_from_row).collect()
    }

    #[instrument(skip(self, job), fields(job_id = job.id, status = %job.status))]
    async fn save_delivery_job(&self, job: &DeliveryJob) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET status = ?, attempts = ?, last_error = ?, next_attempt_at = ?, sent_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(i64::from(job.attempts))
        .bind(&job.last_error)
        .bind(job.next_attempt_at.as_ref().map(Self::timestamp_to_millis))
        .bind(job.sent_at.as_ref().map(Self::timestamp_to_millis))
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("delivery job {}", job.id)));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_delivery_job(&self, id: i64) -> StorageResult<Option<DeliveryJob>> {
        let sql = format!("SELECT {DELIVERY_JOB_COLUMNS} FROM delivery_jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn recent_delivery_jobs(&self, limit: usize) -> StorageResult<Vec<DeliveryJob>> {
        let sql = format!(
            "SELECT {DELIVERY_JOB_COLUMNS} FROM delivery_jobs ORDER BY id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::job_from_row).collect()
    }

    #[instrument(skip(self, entry), fields(scope = %entry.scope))]
    async fn insert_app_log(&self, entry: NewAppLogEntry) -> StorageResult<i64> {
        let result = sqlx::query(
            "INSERT INTO app_logs (level, scope, message, details, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.level.as_str())
        .bind(&entry.scope)
        .bind(&entry.message)
        .bind(&entry.details)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn recent_app_logs(&self, limit: usize) -> StorageResult<Vec<AppLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, level, scope, message, details, created_at
            FROM app_logs
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::log_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
