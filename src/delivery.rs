//! Outbound delivery queue worker
//!
//! Each batch picks the oldest due jobs (pending, or failed with an elapsed
//! retry time) and hands them to the messenger one by one:
//!
//! - success: `sent`, attempt counted, error and schedule cleared
//! - failure: `failed`, attempt counted, error recorded, next attempt pushed
//!   out by the backoff policy
//! - failure at the optional attempt cap: `dead`, never selected again

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::config::DeliveryConfig;
use crate::storage::{DeliveryJob, DeliveryStatus, StorageBackend, StorageResult};
use crate::telegram::Messenger;
use crate::util::truncate_text;

/// Delay before the next attempt, given the attempts made so far
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, attempts: u32) -> Duration;
}

/// Table lookup, the last entry repeats for every further attempt
#[derive(Debug, Clone)]
pub struct TableBackoff {
    table: Vec<Duration>,
}

impl TableBackoff {
    pub fn new(table: Vec<Duration>) -> Self {
        Self { table }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().map(|s| Duration::from_secs(*s)).collect())
    }
}

impl Default for TableBackoff {
    fn default() -> Self {
        Self::from_secs(&[5, 15, 30, 60, 120, 300])
    }
}

impl BackoffPolicy for TableBackoff {
    fn delay(&self, attempts: u32) -> Duration {
        let Some(last) = self.table.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (attempts.max(1) as usize - 1).min(last);
        self.table[index]
    }
}

/// Result of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    pub dead: usize,
}

impl DeliveryReport {
    pub fn processed(&self) -> usize {
        self.sent + self.failed + self.dead
    }
}

#[derive(Clone)]
pub struct DeliveryWorker {
    storage: Arc<dyn StorageBackend>,
    messenger: Arc<dyn Messenger>,
    backoff: Arc<dyn BackoffPolicy>,
    batch_size: usize,
    max_attempts: Option<u32>,
    max_error_len: usize,
}

impl DeliveryWorker {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        messenger: Arc<dyn Messenger>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            storage,
            messenger,
            backoff: Arc::new(TableBackoff::from_secs(&config.backoff_secs)),
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts,
            max_error_len: config.max_error_len,
        }
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Deliver every job that is due at `now`, up to the batch size
    #[instrument(skip(self), fields(now = %now))]
    pub async fn run_batch(&self, now: DateTime<Utc>) -> StorageResult<DeliveryReport> {
        let jobs = self.storage.due_delivery_jobs(now, self.batch_size).await?;
        let mut report = DeliveryReport::default();

        for mut job in jobs {
            let result = self
                .messenger
                .send(&job.token, &job.chat_id, &job.message)
                .await;

            match result {
                Ok(()) => {
                    self.mark_sent(&mut job, Utc::now());
                    report.sent += 1;
                }
                Err(e) => {
                    warn!("delivery job {} failed: {e}", job.id);
                    self.mark_failed(&mut job, &e.to_string(), Utc::now());
                    if job.status == DeliveryStatus::Dead {
                        report.dead += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }

            self.storage.save_delivery_job(&job).await?;
        }

        if report.processed() > 0 {
            debug!("delivery batch: {report:?}");
        }
        Ok(report)
    }

    fn mark_sent(&self, job: &mut DeliveryJob, at: DateTime<Utc>) {
        job.status = DeliveryStatus::Sent;
        job.attempts += 1;
        job.sent_at = Some(at);
        job.last_error = None;
        job.next_attempt_at = None;
    }

    fn mark_failed(&self, job: &mut DeliveryJob, error: &str, at: DateTime<Utc>) {
        job.attempts += 1;
        job.last_error = Some(truncate_text(error, self.max_error_len));

        if self.max_attempts.is_some_and(|cap| job.attempts >= cap) {
            job.status = DeliveryStatus::Dead;
            job.next_attempt_at = None;
            return;
        }

        job.status = DeliveryStatus::Failed;
        let delay = chrono::Duration::from_std(self.backoff.delay(job.attempts))
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        job.next_attempt_at = Some(at + delay);
    }
}
