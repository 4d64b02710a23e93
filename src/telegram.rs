use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{instrument, trace};

/// Why a message could not be handed to the messaging API
#[derive(Debug)]
pub enum DeliveryError {
    /// The API answered with a non-2xx status
    Rejected { status: u16, body: String },
    /// The request never got an answer (DNS, connect, timeout, ...)
    Transport(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Rejected { status, body } => {
                write!(f, "messaging API responded with {status}: {body}")
            }
            DeliveryError::Transport(msg) => write!(f, "messaging API unreachable: {msg}"),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Transport(err.to_string())
    }
}

/// Sends one text message to one chat
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, token: &str, chat_id: &str, text: &str) -> Result<(), DeliveryError>;
}

/// Telegram Bot API client
#[derive(Debug, Clone)]
pub struct TelegramMessenger {
    client: Client,
    base_url: String,
}

impl TelegramMessenger {
    pub fn new(base_url: impl ToString, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    #[instrument(skip(self, token, text))]
    async fn send(&self, token: &str, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/bot{token}/sendMessage", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            trace!("message accepted by {chat_id}");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
