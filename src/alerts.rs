use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::storage::{Bot, BotChat, Device, NewDeliveryJob, StorageBackend, StorageResult};

/// Source tag of jobs queued by the monitor
pub const MONITOR_SOURCE: &str = "monitor";

/// One resolved chat destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertTarget {
    pub bot_id: i64,
    pub token: String,
    pub chat_id: String,
}

/// Pair active chats with their bots, dropping repeated (bot, chat) pairs.
///
/// Chats whose bot is not in `bots` are ignored.
pub fn unique_targets(bots: &[Bot], chats: &[BotChat]) -> Vec<AlertTarget> {
    let mut seen = HashSet::new();

    chats
        .iter()
        .filter(|chat| chat.is_active)
        .filter_map(|chat| {
            let bot = bots.iter().find(|bot| bot.id == chat.bot_id)?;
            seen.insert((bot.id, chat.chat_id.clone()))
                .then(|| AlertTarget {
                    bot_id: bot.id,
                    token: bot.token.clone(),
                    chat_id: chat.chat_id.clone(),
                })
        })
        .collect()
}

/// Expands one alert into delivery jobs for every destination of a device
#[derive(Clone)]
pub struct AlertFanout {
    storage: Arc<dyn StorageBackend>,
}

impl AlertFanout {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Resolve the device's destinations and queue one job per destination.
    ///
    /// Returns the ids of the queued jobs, empty when nobody is assigned.
    #[instrument(skip(self, device, message), fields(device_id = device.id))]
    pub async fn queue_alert(&self, device: &Device, message: &str) -> StorageResult<Vec<i64>> {
        let bots = self.storage.bots_for_device(device.id).await?;
        if bots.is_empty() {
            debug!("{}: no bots assigned, alert dropped", device.name);
            return Ok(Vec::new());
        }

        let bot_ids: Vec<i64> = bots.iter().map(|bot| bot.id).collect();
        let chats = self.storage.active_chats(&bot_ids).await?;
        let targets = unique_targets(&bots, &chats);
        if targets.is_empty() {
            debug!("{}: no active chats, alert dropped", device.name);
            return Ok(Vec::new());
        }

        self.enqueue(&targets, message, MONITOR_SOURCE, None).await
    }

    /// Queue one pending job per target in a single write
    pub async fn enqueue(
        &self,
        targets: &[AlertTarget],
        message: &str,
        source: &str,
        idempotency_key: Option<&str>,
    ) -> StorageResult<Vec<i64>> {
        let jobs = targets
            .iter()
            .map(|target| NewDeliveryJob {
                bot_id: target.bot_id,
                token: target.token.clone(),
                chat_id: target.chat_id.clone(),
                message: message.to_string(),
                idempotency_key: idempotency_key.map(str::to_string),
                source: source.to_string(),
            })
            .collect();

        let ids = self.storage.insert_delivery_jobs(jobs).await?;
        debug!("queued {} jobs from {source}", ids.len());
        Ok(ids)
    }
}

pub fn format_ping_alert(device: &Device) -> String {
    format!(
        "🚨 Ping fail: {} ({}) is unreachable",
        device.name, device.address
    )
}

pub fn format_service_alert(device: &Device, service_label: &str, service_port: u16) -> String {
    format!(
        "⚠️ {service_label} fail: {} ({}) TCP/{service_port} is closed",
        device.name, device.address
    )
}

pub fn format_port_alert(device: &Device, port: u16, label: &str) -> String {
    format!(
        "⚠️ Port fail: {} ({}) TCP/{port} ({label}) is closed",
        device.name, device.address
    )
}
