//! Device availability history endpoint

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::api::{ApiResult, ApiState};
use crate::history::{self, HistoryPeriod};
use crate::storage::{Device, PingHistoryEvent};
use crate::PingStatus;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    period: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeviceSummary {
    id: i64,
    name: String,
    address: String,
    monitor_ping: bool,
}

impl From<Device> for DeviceSummary {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            name: device.name,
            address: device.address,
            monitor_ping: device.monitor_ping,
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryItem {
    status: PingStatus,
    checked_at: chrono::DateTime<Utc>,
}

impl From<PingHistoryEvent> for HistoryItem {
    fn from(event: PingHistoryEvent) -> Self {
        Self {
            status: event.status,
            checked_at: event.checked_at,
        }
    }
}

/// GET /api/devices/:id/history?period=24h|7d|30d|all
///
/// Unknown devices answer with `exists: false` rather than 404
pub async fn get_device_history(
    State(state): State<ApiState>,
    Path(device_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let period = HistoryPeriod::parse(query.period.as_deref());

    let Some(device) = state.storage.get_device(device_id).await? else {
        return Ok(Json(json!({
            "success": true,
            "exists": false,
            "period": period,
            "device": null,
            "history": [],
            "slices": [],
        })));
    };

    let window = history::reconstruct(state.storage.as_ref(), device_id, period, Utc::now()).await?;
    let items: Vec<HistoryItem> = window.events.into_iter().map(HistoryItem::from).collect();

    Ok(Json(json!({
        "success": true,
        "exists": true,
        "period": window.period,
        "device": DeviceSummary::from(device),
        "history": items,
        "slices": window.slices,
    })))
}
