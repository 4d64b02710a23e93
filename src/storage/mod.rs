//! Storage backends for the monitoring store
//!
//! This module provides a trait-based abstraction over the relational store
//! that holds the inventory, the port lists, the transition log, the
//! debounce flags, the delivery queue and the operational log.
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory** (fallback): No persistence, for testing
//!
//! ## Usage
//!
//! ```no_run
//! use pingwarden::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./pingwarden.db").await?;
//!     let devices = backend.list_devices().await?;
//!     println!("{} devices", devices.len());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{InventoryConfig, StorageConfig};

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{
    AppLogEntry, Bot, BotChat, DeliveryJob, DeliveryStatus, Device, DeviceAlertState, LogLevel,
    MonitoredPort, NewAppLogEntry, NewDeliveryJob, PingHistoryEvent, PortAlertState,
};

/// Open the backend selected by the configuration
pub async fn open_backend(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, nothing will be persisted");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteBackend::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "sqlite support was not compiled in".to_string(),
        )),
    }
}

/// Upsert the configured inventory.
///
/// Devices keep their observed statuses, only the inventory fields are
/// overwritten. `monitor_service` is only taken from the seed when the
/// device is created, afterwards it follows the service port toggle.
/// Bots are matched by name and their chats are only added when the bot is
/// created. Returns the ids of the seeded devices.
pub async fn seed_inventory(
    storage: &dyn StorageBackend,
    inventory: &InventoryConfig,
) -> StorageResult<Vec<i64>> {
    for seed in &inventory.bots {
        if storage.find_bot_by_name(&seed.name).await?.is_some() {
            debug!("bot {} already present", seed.name);
            continue;
        }
        let bot_id = storage.create_bot(&seed.name, &seed.token).await?;
        for chat in &seed.chats {
            storage.add_bot_chat(bot_id, &chat.chat_id, chat.active).await?;
        }
        info!("seeded bot {} with {} chats", seed.name, seed.chats.len());
    }

    let mut device_ids = Vec::with_capacity(inventory.devices.len());
    for seed in &inventory.devices {
        let mut device = match storage.get_device(seed.id).await? {
            Some(device) => device,
            None => {
                let mut device = Device::new(seed.id, &seed.name, &seed.address);
                device.monitor_service = seed.monitor_service;
                device
            }
        };
        device.name = seed.name.clone();
        device.address = seed.address.clone();
        device.supports_service = seed.supports_service;
        device.monitor_ping = seed.monitor_ping;
        storage.upsert_device(&device).await?;

        for bot_name in &seed.bots {
            match storage.find_bot_by_name(bot_name).await? {
                Some(bot) => storage.assign_bot(device.id, bot.id).await?,
                None => {
                    return Err(StorageError::InvalidConfig(format!(
                        "device {} references unknown bot '{bot_name}'",
                        seed.name
                    )));
                }
            }
        }
        device_ids.push(device.id);
    }

    Ok(device_ids)
}
