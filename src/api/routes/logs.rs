//! Delivery and operational log endpoint

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiResult, ApiState};
use crate::storage::{AppLogEntry, DeliveryJob, DeliveryStatus};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    limit: Option<String>,
    app_limit: Option<String>,
}

/// Parse a limit parameter, anything unparsable falls back to the default
fn clamp_limit(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v.clamp(1, MAX_LIMIT as i64) as usize)
        .unwrap_or(DEFAULT_LIMIT)
}

/// A delivery job without its credential
#[derive(Debug, Serialize)]
struct DeliveryLogRow {
    id: i64,
    message: String,
    status: DeliveryStatus,
    attempts: u32,
    last_error: Option<String>,
    next_attempt_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    source: String,
}

impl From<DeliveryJob> for DeliveryLogRow {
    fn from(job: DeliveryJob) -> Self {
        Self {
            id: job.id,
            message: job.message,
            status: job.status,
            attempts: job.attempts,
            last_error: job.last_error,
            next_attempt_at: job.next_attempt_at,
            created_at: job.created_at,
            sent_at: job.sent_at,
            source: job.source,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    logs: Vec<DeliveryLogRow>,
    app_logs: Vec<AppLogEntry>,
}

/// GET /api/logs?limit=&app_limit=
///
/// Newest first, both limits default to 50 and are clamped to 1..=200
pub async fn get_logs(
    State(state): State<ApiState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let limit = clamp_limit(query.limit.as_deref());
    let app_limit = clamp_limit(query.app_limit.as_deref());

    let logs = state
        .storage
        .recent_delivery_jobs(limit)
        .await?
        .into_iter()
        .map(DeliveryLogRow::from)
        .collect();
    let app_logs = state.storage.recent_app_logs(app_limit).await?;

    Ok(Json(LogsResponse { logs, app_logs }))
}
