//! Externally submitted messages with idempotent enqueueing
//!
//! A submission names a bot, optionally one of its chats, and carries an
//! idempotency key. The first submission of a key queues one job per
//! resolved chat; every later submission with the same key gets the ids of
//! those jobs back and queues nothing.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::alerts::{AlertFanout, AlertTarget, unique_targets};
use crate::storage::{Bot, StorageBackend, StorageError};

#[derive(Debug)]
pub enum InboundError {
    /// Malformed submission, nothing was written
    Invalid(String),
    /// Bot or destination could not be resolved
    NotFound(String),
    Storage(StorageError),
}

impl fmt::Display for InboundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundError::Invalid(msg) => write!(f, "{msg}"),
            InboundError::NotFound(msg) => write!(f, "{msg}"),
            InboundError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for InboundError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InboundError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for InboundError {
    fn from(err: StorageError) -> Self {
        InboundError::Storage(err)
    }
}

/// Body of `POST /api/inbound/messages`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    pub bot_name: Option<String>,
    pub chat_id: Option<String>,
    pub text: Option<String>,
    pub source: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundReceipt {
    pub bot_id: i64,
    pub bot_name: String,
    pub deduplicated: bool,
    pub queued: usize,
    pub notification_ids: Vec<i64>,
}

/// A validated submission
#[derive(Debug)]
struct Submission {
    bot_name: String,
    chat_id: Option<String>,
    message: String,
    source: String,
    idempotency_key: String,
}

fn required(value: Option<&str>, field: &str) -> Result<String, InboundError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| InboundError::Invalid(format!("{field} is required")))
}

impl InboundMessage {
    fn validate(&self) -> Result<Submission, InboundError> {
        let bot_name = required(self.bot_name.as_deref(), "bot_name")?;
        let text = required(self.text.as_deref(), "text")?;
        let idempotency_key = required(self.idempotency_key.as_deref(), "idempotency_key")?;

        let chat_id = self
            .chat_id
            .as_deref()
            .map(str::trim)
            .filter(|chat| !chat.is_empty())
            .map(str::to_string);

        let source = self
            .source
            .as_deref()
            .map(str::trim)
            .filter(|source| !source.is_empty());

        let (message, source) = match source {
            Some(source) => (
                format!("[{source}] {text}"),
                format!("rest:{}", source.to_lowercase()),
            ),
            None => (text, "rest".to_string()),
        };

        Ok(Submission {
            bot_name,
            chat_id,
            message,
            source,
            idempotency_key,
        })
    }
}

#[derive(Clone)]
pub struct InboundGateway {
    storage: Arc<dyn StorageBackend>,
    fanout: AlertFanout,
    // check-then-insert of a key must not interleave
    submit_lock: Arc<Mutex<()>>,
}

impl InboundGateway {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            fanout: AlertFanout::new(storage.clone()),
            storage,
            submit_lock: Arc::new(Mutex::new(())),
        }
    }

    #[instrument(skip_all, fields(bot = ?message.bot_name))]
    pub async fn submit(&self, message: InboundMessage) -> Result<InboundReceipt, InboundError> {
        let submission = message.validate()?;

        let _guard = self.submit_lock.lock().await;

        let bot = self
            .storage
            .find_bot_by_name(&submission.bot_name)
            .await?
            .ok_or_else(|| InboundError::NotFound("Bot not found".to_string()))?;

        let existing = self
            .storage
            .job_ids_by_idempotency_key(&submission.idempotency_key)
            .await?;
        if let Some(first) = existing.first() {
            debug!(
                "idempotency key {} already used by {} jobs",
                submission.idempotency_key,
                existing.len()
            );
            // report the bot the key was first used with
            let owner = self.job_owner(*first).await?.unwrap_or(bot);
            return Ok(InboundReceipt {
                bot_id: owner.id,
                bot_name: owner.name,
                deduplicated: true,
                queued: 0,
                notification_ids: existing,
            });
        }

        let chats = self.storage.active_chats(&[bot.id]).await?;
        let targets: Vec<AlertTarget> = unique_targets(std::slice::from_ref(&bot), &chats)
            .into_iter()
            .filter(|target| {
                submission
                    .chat_id
                    .as_ref()
                    .is_none_or(|chat_id| &target.chat_id == chat_id)
            })
            .collect();

        if targets.is_empty() {
            let reason = match submission.chat_id {
                Some(_) => "Chat not found or inactive for this bot",
                None => "Bot has no active chats",
            };
            return Err(InboundError::NotFound(reason.to_string()));
        }

        let ids = self
            .fanout
            .enqueue(
                &targets,
                &submission.message,
                &submission.source,
                Some(&submission.idempotency_key),
            )
            .await?;

        info!("queued {} inbound jobs for bot {}", ids.len(), bot.name);
        Ok(InboundReceipt {
            bot_id: bot.id,
            bot_name: bot.name,
            deduplicated: false,
            queued: ids.len(),
            notification_ids: ids,
        })
    }

    async fn job_owner(&self, job_id: i64) -> Result<Option<Bot>, InboundError> {
        let Some(job) = self.storage.get_delivery_job(job_id).await? else {
            return Ok(None);
        };
        Ok(self.storage.get_bot(job.bot_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use assert_matches::assert_matches;

    fn message(key: &str) -> InboundMessage {
        InboundMessage {
            bot_name: Some("ops".to_string()),
            chat_id: None,
            text: Some("  backup finished  ".to_string()),
            source: None,
            idempotency_key: Some(key.to_string()),
        }
    }

    async fn gateway_with_chats(chats: &[(&str, bool)]) -> (Arc<MemoryBackend>, InboundGateway) {
        let storage = Arc::new(MemoryBackend::new());
        let bot = storage.create_bot("ops", "token").await.unwrap();
        for (chat_id, active) in chats {
            storage.add_bot_chat(bot, chat_id, *active).await.unwrap();
        }
        let gateway = InboundGateway::new(storage.clone());
        (storage, gateway)
    }

    #[test]
    fn test_validation_messages() {
        let mut msg = message("k");
        msg.bot_name = Some("   ".to_string());
        assert_matches!(
            msg.validate(),
            Err(InboundError::Invalid(m)) if m == "bot_name is required"
        );

        let mut msg = message("k");
        msg.text = None;
        assert_matches!(msg.validate(), Err(InboundError::Invalid(m)) if m == "text is required");

        let mut msg = message("k");
        msg.idempotency_key = Some(String::new());
        assert_matches!(
            msg.validate(),
            Err(InboundError::Invalid(m)) if m == "idempotency_key is required"
        );
    }

    #[test]
    fn test_source_prefix_and_tag() {
        let mut msg = message("k");
        msg.source = Some(" Backup ".to_string());

        let submission = msg.validate().unwrap();
        assert_eq!(submission.message, "[Backup] backup finished");
        assert_eq!(submission.source, "rest:backup");

        let submission = message("k").validate().unwrap();
        assert_eq!(submission.message, "backup finished");
        assert_eq!(submission.source, "rest");
    }

    #[tokio::test]
    async fn test_same_key_is_deduplicated() {
        let (storage, gateway) = gateway_with_chats(&[("1", true), ("2", true)]).await;

        let first = gateway.submit(message("nightly-42")).await.unwrap();
        assert_eq!(first.queued, 2);
        assert!(!first.deduplicated);

        let second = gateway.submit(message("nightly-42")).await.unwrap();
        assert_eq!(second.queued, 0);
        assert!(second.deduplicated);
        assert_eq!(second.notification_ids, first.notification_ids);

        assert_eq!(storage.recent_delivery_jobs(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reused_key_reports_owning_bot() {
        let (storage, gateway) = gateway_with_chats(&[("1", true)]).await;
        let other = storage.create_bot("backup", "token-2").await.unwrap();
        storage.add_bot_chat(other, "9", true).await.unwrap();

        let first = gateway.submit(message("shared")).await.unwrap();

        let mut msg = message("shared");
        msg.bot_name = Some("backup".to_string());
        let second = gateway.submit(msg).await.unwrap();

        assert!(second.deduplicated);
        assert_eq!(second.bot_id, first.bot_id);
        assert_eq!(second.bot_name, "ops");
        assert_eq!(second.notification_ids, first.notification_ids);
    }

    #[tokio::test]
    async fn test_chat_targeting() {
        let (_storage, gateway) = gateway_with_chats(&[("1", true), ("2", false)]).await;

        let mut msg = message("a");
        msg.chat_id = Some("1".to_string());
        assert_eq!(gateway.submit(msg).await.unwrap().queued, 1);

        let mut msg = message("b");
        msg.chat_id = Some("2".to_string());
        assert_matches!(gateway.submit(msg).await, Err(InboundError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_bot() {
        let (_storage, gateway) = gateway_with_chats(&[("1", true)]).await;

        let mut msg = message("a");
        msg.bot_name = Some("nobody".to_string());
        assert_matches!(gateway.submit(msg).await, Err(InboundError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bot_without_active_chats() {
        let (_storage, gateway) = gateway_with_chats(&[("1", false)]).await;
        assert_matches!(gateway.submit(message("a")).await, Err(InboundError::NotFound(_)));
    }
}
