//! Shared state passed to all API handlers

use std::sync::Arc;

use crate::config::MonitorConfig;
use crate::inbound::InboundGateway;
use crate::monitors::Prober;
use crate::ports::PortService;
use crate::storage::StorageBackend;

#[derive(Clone)]
pub struct ApiState {
    pub storage: Arc<dyn StorageBackend>,
    pub ports: PortService,
    pub inbound: InboundGateway,
}

impl ApiState {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        prober: Arc<dyn Prober>,
        monitor: &MonitorConfig,
    ) -> Self {
        Self {
            ports: PortService::new(storage.clone(), prober, monitor),
            inbound: InboundGateway::new(storage.clone()),
            storage,
        }
    }
}
