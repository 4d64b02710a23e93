use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./pingwarden.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Devices, bots and assignments upserted on start-up
    pub inventory: Option<InventoryConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_true() -> bool {
    true
}

/// A port that is always present in a device's port list
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct KnownPort {
    pub port: u16,
    pub label: String,
}

impl KnownPort {
    pub fn new(port: u16, label: impl ToString) -> Self {
        Self {
            port,
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout_ms: u64,
    /// Delays between the retries of a failed probe
    #[serde(default = "default_retry_delays")]
    pub retry_delays_secs: Vec<u64>,
    #[serde(default = "default_service_port")]
    pub service_port: u16,
    #[serde(default = "default_service_label")]
    pub service_label: String,
    #[serde(default = "default_known_ports")]
    pub known_ports: Vec<KnownPort>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            ping_timeout_ms: default_ping_timeout(),
            tcp_timeout_ms: default_tcp_timeout(),
            retry_delays_secs: default_retry_delays(),
            service_port: default_service_port(),
            service_label: default_service_label(),
            known_ports: default_known_ports(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_secs
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect()
    }
}

fn default_monitor_interval() -> u64 {
    30
}

fn default_ping_timeout() -> u64 {
    1000
}

fn default_tcp_timeout() -> u64 {
    900
}

fn default_retry_delays() -> Vec<u64> {
    vec![5, 10, 15]
}

fn default_service_port() -> u16 {
    502
}

fn default_service_label() -> String {
    "Modbus TCP".to_string()
}

pub fn default_known_ports() -> Vec<KnownPort> {
    vec![
        KnownPort::new(21, "FTP"),
        KnownPort::new(22, "SFTP/SSH"),
        KnownPort::new(80, "HTTP"),
        KnownPort::new(443, "HTTPS"),
        KnownPort::new(502, "Modbus TCP"),
        KnownPort::new(1883, "MQTT"),
        KnownPort::new(3671, "KNX/IP"),
        KnownPort::new(8883, "MQTTS"),
    ]
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_delivery_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retry delay table indexed by attempt count, the last entry repeats
    #[serde(default = "default_backoff")]
    pub backoff_secs: Vec<u64>,
    /// Give up on a job after this many attempts (unbounded when absent)
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_max_error_len")]
    pub max_error_len: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_delivery_interval(),
            batch_size: default_batch_size(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            backoff_secs: default_backoff(),
            max_attempts: None,
            max_error_len: default_max_error_len(),
        }
    }
}

impl DeliveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn default_delivery_interval() -> u64 {
    5
}

fn default_batch_size() -> usize {
    20
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_backoff() -> Vec<u64> {
    vec![5, 15, 30, 60, 120, 300]
}

fn default_max_error_len() -> usize {
    512
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub devices: Vec<DeviceSeed>,
    #[serde(default)]
    pub bots: Vec<BotSeed>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DeviceSeed {
    pub id: i64,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub supports_service: bool,
    #[serde(default)]
    pub monitor_ping: bool,
    #[serde(default)]
    pub monitor_service: bool,
    /// Names of the bots that receive this device's alerts
    #[serde(default)]
    pub bots: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BotSeed {
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub chats: Vec<ChatSeed>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatSeed {
    pub chat_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Config {
    /// Storage configuration with the `PINGWARDEN_DB_PATH` override applied
    pub fn resolved_storage(&self) -> StorageConfig {
        let storage = self.storage.clone().unwrap_or_default();
        match (storage, crate::util::get_db_path()) {
            (StorageConfig::Sqlite { .. }, Some(path)) => StorageConfig::Sqlite { path },
            (storage, _) => storage,
        }
    }

    /// API settings with the `PINGWARDEN_ADDR` override applied
    pub fn resolved_api(&self) -> ApiSettings {
        let mut api = self.api.clone();
        if let Some(addr) = crate::util::get_bind_addr() {
            api.bind_addr = addr;
        }
        api
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
