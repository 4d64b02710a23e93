//! Operational log written next to the tracing output
//!
//! Entries land in the `app_logs` table and are served by `GET /api/logs`.
//! Writing is fire-and-forget: a failing write is only traced.

use std::sync::Arc;

use tracing::error;

use crate::storage::{LogLevel, NewAppLogEntry, StorageBackend};
use crate::util::truncate_text;

const MAX_MESSAGE_CHARS: usize = 512;
const MAX_DETAILS_CHARS: usize = 4000;

#[derive(Clone)]
pub struct OperationalLog {
    storage: Arc<dyn StorageBackend>,
}

impl OperationalLog {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub async fn record(
        &self,
        level: LogLevel,
        scope: &str,
        message: &str,
        details: Option<&str>,
    ) {
        let entry = NewAppLogEntry {
            level,
            scope: scope.to_string(),
            message: truncate_text(message, MAX_MESSAGE_CHARS),
            details: details.map(|details| truncate_text(details, MAX_DETAILS_CHARS)),
        };

        if let Err(e) = self.storage.insert_app_log(entry).await {
            error!("failed to write operational log entry ({scope}): {e}");
        }
    }

    pub async fn info(&self, scope: &str, message: &str) {
        self.record(LogLevel::Info, scope, message, None).await;
    }

    pub async fn error(&self, scope: &str, message: &str, details: Option<&str>) {
        self.record(LogLevel::Error, scope, message, details).await;
    }
}
