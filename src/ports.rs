//! Per-device port lists
//!
//! Every device carries the configured catalog of known ports. Those rows are
//! created on demand (disabled, status unknown) and can never be deleted,
//! only toggled. Custom ports join the list when a scan finds them open or
//! when monitoring is switched on for them, and are pruned by the next
//! catalog scan once they are neither enabled nor open.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::PortStatus;
use crate::config::{KnownPort, MonitorConfig};
use crate::monitors::Prober;
use crate::storage::{Device, MonitoredPort, StorageBackend, StorageError};

#[derive(Debug)]
pub enum PortError {
    DeviceNotFound(i64),
    InvalidPort(String),
    /// The port may not be removed from the list
    Protected(String),
    Storage(StorageError),
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::DeviceNotFound(id) => write!(f, "Device {id} not found"),
            PortError::InvalidPort(msg) => write!(f, "{msg}"),
            PortError::Protected(msg) => write!(f, "{msg}"),
            PortError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PortError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for PortError {
    fn from(err: StorageError) -> Self {
        PortError::Storage(err)
    }
}

/// A port row as exposed over the API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortView {
    pub device_id: i64,
    pub port: u16,
    pub label: String,
    pub monitor_enabled: bool,
    pub last_status: PortStatus,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

impl From<MonitoredPort> for PortView {
    fn from(row: MonitoredPort) -> Self {
        Self {
            device_id: row.device_id,
            port: row.port,
            label: row.label,
            monitor_enabled: row.monitor_enabled,
            last_status: row.last_status,
            last_scanned_at: row.last_scanned_at,
        }
    }
}

/// Single probe result of a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortProbe {
    pub port: u16,
    pub label: String,
    pub status: PortStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub scanned_at: DateTime<Utc>,
    /// Every probed port, open or not
    pub open_ports: Vec<PortProbe>,
    pub ports: Vec<PortView>,
}

#[derive(Clone)]
pub struct PortService {
    storage: Arc<dyn StorageBackend>,
    prober: Arc<dyn Prober>,
    catalog: Vec<KnownPort>,
    service_port: u16,
}

impl PortService {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        prober: Arc<dyn Prober>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            storage,
            prober,
            catalog: config.known_ports.clone(),
            service_port: config.service_port,
        }
    }

    pub fn known_port(&self, port: u16) -> Option<&KnownPort> {
        self.catalog.iter().find(|known| known.port == port)
    }

    fn label_for(&self, port: u16) -> String {
        self.known_port(port)
            .map(|known| known.label.clone())
            .unwrap_or_else(|| format!("TCP {port}"))
    }

    async fn device(&self, device_id: i64) -> Result<Device, PortError> {
        self.storage
            .get_device(device_id)
            .await?
            .ok_or(PortError::DeviceNotFound(device_id))
    }

    fn validate_port(port: i64) -> Result<u16, PortError> {
        u16::try_from(port)
            .ok()
            .filter(|port| *port > 0)
            .ok_or_else(|| PortError::InvalidPort(format!("Invalid port: {port}")))
    }

    /// Create the missing catalog rows of a device
    pub async fn ensure_known_ports(&self, device_id: i64) -> Result<(), PortError> {
        let existing = self.storage.list_ports(device_id).await?;
        for known in &self.catalog {
            if existing.iter().any(|row| row.port == known.port) {
                continue;
            }
            self.storage
                .upsert_port(&MonitoredPort::new(device_id, known.port, &known.label))
                .await?;
        }
        Ok(())
    }

    /// The device's port list ordered by port number
    pub async fn list(&self, device_id: i64) -> Result<Vec<PortView>, PortError> {
        self.device(device_id).await?;
        self.views(device_id).await
    }

    async fn views(&self, device_id: i64) -> Result<Vec<PortView>, PortError> {
        let mut ports = self.storage.list_ports(device_id).await?;
        ports.sort_by_key(|row| row.port);
        Ok(ports.into_iter().map(PortView::from).collect())
    }

    /// Probe every catalog port once, concurrently and without retries
    #[instrument(skip(self))]
    pub async fn scan_known(&self, device_id: i64) -> Result<ScanResult, PortError> {
        let device = self.device(device_id).await?;
        self.ensure_known_ports(device_id).await?;

        let address = device.address.as_str();
        let statuses = join_all(
            self.catalog
                .iter()
                .map(|known| self.prober.tcp(address, known.port)),
        )
        .await;

        let scanned_at = Utc::now();
        let mut probes = Vec::with_capacity(statuses.len());
        for (known, status) in self.catalog.iter().zip(statuses) {
            let mut row = self
                .storage
                .get_port(device_id, known.port)
                .await?
                .unwrap_or_else(|| MonitoredPort::new(device_id, known.port, &known.label));
            row.last_status = status;
            row.last_scanned_at = Some(scanned_at);
            self.storage.upsert_port(&row).await?;

            probes.push(PortProbe {
                port: known.port,
                label: known.label.clone(),
                status,
            });
        }

        let pruned = self.prune_custom(device_id).await?;
        info!(
            "scanned {} known ports on {}, {} open, {pruned} stale custom ports pruned",
            probes.len(),
            device.name,
            probes
                .iter()
                .filter(|probe| probe.status == PortStatus::Open)
                .count()
        );

        Ok(ScanResult {
            scanned_at,
            open_ports: probes,
            ports: self.views(device_id).await?,
        })
    }

    async fn prune_custom(&self, device_id: i64) -> Result<usize, PortError> {
        let mut pruned = 0;
        for row in self.storage.list_ports(device_id).await? {
            let stale = self.known_port(row.port).is_none()
                && !row.monitor_enabled
                && row.last_status != PortStatus::Open;
            if stale && self.storage.delete_port(device_id, row.port).await? {
                debug!("pruned custom port {}:{}", device_id, row.port);
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Probe one arbitrary port.
    ///
    /// The result is only written when the port is open, part of the catalog,
    /// or already in the device's list.
    #[instrument(skip(self))]
    pub async fn scan_custom(&self, device_id: i64, port: i64) -> Result<ScanResult, PortError> {
        let port = Self::validate_port(port)?;
        let device = self.device(device_id).await?;
        self.ensure_known_ports(device_id).await?;

        let status = self.prober.tcp(&device.address, port).await;
        let scanned_at = Utc::now();

        let existing = self.storage.get_port(device_id, port).await?;
        let persist =
            status == PortStatus::Open || existing.is_some() || self.known_port(port).is_some();
        if persist {
            let mut row = existing
                .unwrap_or_else(|| MonitoredPort::new(device_id, port, self.label_for(port)));
            row.last_status = status;
            row.last_scanned_at = Some(scanned_at);
            self.storage.upsert_port(&row).await?;
        }
        debug!("{}:{port} -> {status} (persisted: {persist})", device.address);

        Ok(ScanResult {
            scanned_at,
            open_ports: vec![PortProbe {
                port,
                label: self.label_for(port),
                status,
            }],
            ports: self.views(device_id).await?,
        })
    }

    /// Switch monitoring of a port, creating its row when needed.
    ///
    /// The service port also carries the device's service-monitoring flag.
    #[instrument(skip(self))]
    pub async fn set_monitoring(
        &self,
        device_id: i64,
        port: i64,
        enabled: bool,
    ) -> Result<Vec<PortView>, PortError> {
        let port = Self::validate_port(port)?;
        let mut device = self.device(device_id).await?;
        self.ensure_known_ports(device_id).await?;

        let mut row = self
            .storage
            .get_port(device_id, port)
            .await?
            .unwrap_or_else(|| MonitoredPort::new(device_id, port, self.label_for(port)));
        row.monitor_enabled = enabled;
        self.storage.upsert_port(&row).await?;

        if port == self.service_port && device.monitor_service != enabled {
            device.monitor_service = enabled;
            self.storage.upsert_device(&device).await?;
        }

        info!(
            "monitoring of {}:{port} {}",
            device.name,
            if enabled { "enabled" } else { "disabled" }
        );
        self.views(device_id).await
    }

    /// Remove a custom, unmonitored port from the list
    #[instrument(skip(self))]
    pub async fn delete(&self, device_id: i64, port: i64) -> Result<Vec<PortView>, PortError> {
        let port = Self::validate_port(port)?;
        self.device(device_id).await?;

        if self.known_port(port).is_some() {
            return Err(PortError::Protected(format!(
                "Port {port} is a known port and cannot be deleted"
            )));
        }

        if let Some(row) = self.storage.get_port(device_id, port).await? {
            if row.monitor_enabled {
                return Err(PortError::Protected(format!(
                    "Port {port} is monitored, disable monitoring before deleting it"
                )));
            }
        }

        self.storage.delete_port(device_id, port).await?;
        self.views(device_id).await
    }
}
