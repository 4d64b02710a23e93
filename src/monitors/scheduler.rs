//! One monitoring pass over every device
//!
//! ## Per-device flow
//!
//! ```text
//! enabled checks? ──no──► release debounce flags, skip
//!       │
//!       ▼
//! reachability (retry) ──► transition log
//! service port (retry)
//! monitored ports (retry) ──► port rows
//!       │
//!       ▼
//! debounce evaluation ──► alert fan-out
//!       │
//!       ▼
//! device row (statuses, last seen)
//! ```
//!
//! Cycles are single-flight: a cycle requested while another is running is
//! skipped instead of overlapping, since two passes would race on the same
//! debounce flags.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, instrument, trace, warn};

use crate::alerts::{self, AlertFanout};
use crate::config::MonitorConfig;
use crate::history;
use crate::monitors::debounce::AlertEvaluation;
use crate::monitors::probe::{Prober, probe_with_retry};
use crate::oplog::OperationalLog;
use crate::storage::{
    Device, DeviceAlertState, MonitoredPort, PortAlertState, StorageBackend, StorageResult,
};
use crate::{PingStatus, PortStatus};

/// Summary of a completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub devices_checked: usize,
    pub devices_skipped: usize,
    /// Dimensions that started failing in this cycle
    pub alerts_raised: usize,
    pub jobs_queued: usize,
    pub device_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was still running
    Skipped,
    /// The cycle could not start (device list unavailable)
    Failed(String),
}

enum DeviceCheck {
    Skipped,
    Checked { alerts: usize, jobs: usize },
}

/// Resets the in-flight flag when the cycle ends, even on panic
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct MonitorScheduler {
    storage: Arc<dyn StorageBackend>,
    prober: Arc<dyn Prober>,
    fanout: AlertFanout,
    oplog: OperationalLog,
    config: MonitorConfig,
    retry_delays: Vec<Duration>,
    in_flight: Arc<AtomicBool>,
}

impl MonitorScheduler {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        prober: Arc<dyn Prober>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            fanout: AlertFanout::new(storage.clone()),
            oplog: OperationalLog::new(storage.clone()),
            retry_delays: config.retry_delays(),
            storage,
            prober,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run a cycle unless one is already in flight.
    ///
    /// Failures are written to the operational log and never propagated.
    pub async fn run_cycle_guarded(&self) -> CycleOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous monitor cycle still running, skipping tick");
            return CycleOutcome::Skipped;
        }
        let _in_flight = InFlight(self.in_flight.clone());

        match self.run_cycle().await {
            Ok(report) => {
                debug!("monitor cycle finished: {report:?}");
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                error!("monitor cycle failed: {e}");
                self.oplog
                    .error("monitor", "Monitor cycle failed", Some(&e.to_string()))
                    .await;
                CycleOutcome::Failed(e.to_string())
            }
        }
    }

    #[instrument(skip(self))]
    async fn run_cycle(&self) -> StorageResult<CycleReport> {
        let devices = self.storage.list_devices().await?;
        let mut report = CycleReport::default();

        for device in devices {
            let name = device.name.clone();
            match self.check_device(device).await {
                Ok(DeviceCheck::Skipped) => report.devices_skipped += 1,
                Ok(DeviceCheck::Checked { alerts, jobs }) => {
                    report.devices_checked += 1;
                    report.alerts_raised += alerts;
                    report.jobs_queued += jobs;
                }
                Err(e) => {
                    warn!("{name}: device check failed: {e}");
                    report.device_failures += 1;
                    self.oplog
                        .error(
                            "monitor",
                            &format!("Device check failed: {name}"),
                            Some(&e.to_string()),
                        )
                        .await;
                }
            }
        }

        Ok(report)
    }

    #[instrument(skip_all, fields(device = %device.name))]
    async fn check_device(&self, device: Device) -> StorageResult<DeviceCheck> {
        let service_port = self.config.service_port;
        let service_enabled = device.service_check_enabled();
        let monitored: Vec<MonitoredPort> = self
            .storage
            .list_ports(device.id)
            .await?
            .into_iter()
            .filter(|port| port.monitor_enabled)
            .collect();

        if !device.monitor_ping && !service_enabled && monitored.is_empty() {
            self.release_flags(device.id).await?;
            return Ok(DeviceCheck::Skipped);
        }

        let address = device.address.as_str();
        let mut alerts = Vec::new();

        let ping_status = if device.monitor_ping {
            let status = probe_with_retry(&self.retry_delays, || {
                self.prober.reachability(address)
            })
            .await;
            history::record_transition(self.storage.as_ref(), device.id, status, Utc::now())
                .await?;
            status
        } else {
            PingStatus::Disabled
        };

        let service_status = if service_enabled {
            probe_with_retry(&self.retry_delays, || {
                self.prober.tcp(address, service_port)
            })
            .await
        } else {
            PortStatus::Disabled
        };

        let mut enrolled_ports = Vec::new();
        for mut port in monitored {
            let shares_service_probe = service_enabled && port.port == service_port;
            let status = if shares_service_probe {
                service_status
            } else {
                probe_with_retry(&self.retry_delays, || self.prober.tcp(address, port.port))
                    .await
            };
            trace!("{}:{} -> {status}", device.address, port.port);

            port.last_status = status;
            port.last_scanned_at = Some(Utc::now());
            self.storage.upsert_port(&port).await?;

            // the service dimension already alerts for this port
            if shares_service_probe {
                continue;
            }

            enrolled_ports.push(port.port);
            if self.evaluate_port(&device, &port).await? {
                alerts.push(alerts::format_port_alert(&device, port.port, &port.label));
            }
        }

        self.storage
            .clear_port_alert_states_except(device.id, &enrolled_ports)
            .await?;

        let mut state = self
            .storage
            .get_device_alert_state(device.id)
            .await?
            .unwrap_or_else(|| DeviceAlertState::armed(device.id));
        let mut state_changed = false;

        let ping =
            AlertEvaluation::evaluate(ping_status == PingStatus::Offline, state.ping_down_sent);
        if ping.should_alert() {
            alerts.push(alerts::format_ping_alert(&device));
        }
        state_changed |= ping.changes_flag();
        state.ping_down_sent = ping.next_flag();

        let service = AlertEvaluation::evaluate(
            service_status == PortStatus::Closed,
            state.service_down_sent,
        );
        if service.should_alert() {
            alerts.push(alerts::format_service_alert(
                &device,
                &self.config.service_label,
                service_port,
            ));
        }
        state_changed |= service.changes_flag();
        state.service_down_sent = service.next_flag();

        let mut jobs = 0;
        for message in &alerts {
            jobs += self.fanout.queue_alert(&device, message).await?.len();
        }

        if state_changed {
            self.storage.save_device_alert_state(&state).await?;
        }

        // reload so concurrent edits to the inventory fields survive
        match self.storage.get_device(device.id).await? {
            Some(mut row) => {
                row.last_ping_status = ping_status;
                row.last_service_status = service_status;
                row.last_seen_at = Some(Utc::now());
                self.storage.upsert_device(&row).await?;
            }
            None => debug!("device {} was removed during the cycle", device.id),
        }

        Ok(DeviceCheck::Checked {
            alerts: alerts.len(),
            jobs,
        })
    }

    /// Evaluate a port's debounce flag, returns whether an alert is due.
    ///
    /// The flag is only set here when the alert was requested, the caller
    /// queues the message right after.
    async fn evaluate_port(&self, device: &Device, port: &MonitoredPort) -> StorageResult<bool> {
        let alert_sent = self
            .storage
            .get_port_alert_state(device.id, port.port)
            .await?
            .is_some_and(|state| state.down_sent);

        let evaluation =
            AlertEvaluation::evaluate(port.last_status == PortStatus::Closed, alert_sent);
        if evaluation.changes_flag() {
            self.storage
                .save_port_alert_state(&PortAlertState {
                    device_id: device.id,
                    port: port.port,
                    down_sent: evaluation.next_flag(),
                })
                .await?;
        }

        Ok(evaluation.should_alert())
    }

    async fn release_flags(&self, device_id: i64) -> StorageResult<()> {
        if let Some(state) = self.storage.get_device_alert_state(device_id).await? {
            if state.ping_down_sent || state.service_down_sent {
                self.storage
                    .save_device_alert_state(&DeviceAlertState::armed(device_id))
                    .await?;
            }
        }

        self.storage
            .clear_port_alert_states_except(device_id, &[])
            .await?;
        Ok(())
    }
}
