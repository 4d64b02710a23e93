//! Row definitions for the monitoring store
//!
//! ## Ownership
//!
//! - **Inventory rows** (`Device`, `Bot`, `BotChat`, device→bot assignments) are
//!   created by the inventory collaborator. The monitoring core only updates the
//!   monitoring fields of `Device`.
//! - **Port rows** (`MonitoredPort`) are created by catalog scans and toggles.
//! - **Transition log** (`PingHistoryEvent`) is append-only.
//! - **Debounce rows** (`DeviceAlertState`, `PortAlertState`) are keyed state
//!   tables, created lazily on first evaluation.
//! - **Delivery jobs** are created by alert fan-out and the inbound gateway and
//!   only mutated by the delivery worker. They are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PingStatus, PortStatus};

/// A monitored network device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    /// Network address used by all probes
    pub address: String,
    /// The device speaks the designated service protocol
    pub supports_service: bool,
    pub monitor_ping: bool,
    pub monitor_service: bool,
    pub last_ping_status: PingStatus,
    pub last_service_status: PortStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Device {
    /// A freshly inventoried device with no observations yet
    pub fn new(id: i64, name: impl ToString, address: impl ToString) -> Self {
        Self {
            id,
            name: name.to_string(),
            address: address.to_string(),
            supports_service: false,
            monitor_ping: false,
            monitor_service: false,
            last_ping_status: PingStatus::Unknown,
            last_service_status: PortStatus::Unknown,
            last_seen_at: None,
        }
    }

    /// The service check only runs on devices that support the service
    pub fn service_check_enabled(&self) -> bool {
        self.monitor_service && self.supports_service
    }
}

/// A (device, port) pair in the device's port list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredPort {
    pub device_id: i64,
    pub port: u16,
    pub label: String,
    pub monitor_enabled: bool,
    pub last_status: PortStatus,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

impl MonitoredPort {
    pub fn new(device_id: i64, port: u16, label: impl ToString) -> Self {
        Self {
            device_id,
            port,
            label: label.to_string(),
            monitor_enabled: false,
            last_status: PortStatus::Unknown,
            last_scanned_at: None,
        }
    }
}

/// One entry of the per-device reachability transition log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingHistoryEvent {
    pub id: i64,
    pub device_id: i64,
    pub status: PingStatus,
    pub checked_at: DateTime<Utc>,
}

/// Debounce flags for the device-level dimensions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAlertState {
    pub device_id: i64,
    pub ping_down_sent: bool,
    pub service_down_sent: bool,
}

impl DeviceAlertState {
    pub fn armed(device_id: i64) -> Self {
        Self {
            device_id,
            ..Default::default()
        }
    }
}

/// Debounce flag for a single monitored port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortAlertState {
    pub device_id: i64,
    pub port: u16,
    pub down_sent: bool,
}

/// A bot credential that owns chat destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub token: String,
}

/// A chat destination owned by a bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotChat {
    pub id: i64,
    pub bot_id: i64,
    pub chat_id: String,
    pub is_active: bool,
}

/// Lifecycle of a delivery job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Failed,
    Sent,
    /// Gave up after the configured attempt cap
    Dead,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Dead => "dead",
        }
    }

    /// Pending and failed jobs are picked up by the worker
    pub fn is_deliverable(&self) -> bool {
        matches!(self, DeliveryStatus::Pending | DeliveryStatus::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "failed" => Ok(DeliveryStatus::Failed),
            "sent" => Ok(DeliveryStatus::Sent),
            "dead" => Ok(DeliveryStatus::Dead),
            other => Err(format!("invalid delivery status '{other}'")),
        }
    }
}

/// An outbound message to one chat destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: i64,
    pub bot_id: i64,
    pub token: String,
    pub chat_id: String,
    pub message: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Only set for inbound submissions
    pub idempotency_key: Option<String>,
    pub source: String,
}

/// A delivery job that has not been persisted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryJob {
    pub bot_id: i64,
    pub token: String,
    pub chat_id: String,
    pub message: String,
    pub idempotency_key: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("invalid log level '{other}'")),
        }
    }
}

/// An operational log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppLogEntry {
    pub id: i64,
    pub level: LogLevel,
    pub scope: String,
    pub message: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAppLogEntry {
    pub level: LogLevel,
    pub scope: String,
    pub message: String,
    pub details: Option<String>,
}
