//! Device port list endpoints

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{ApiError, ApiResult, ApiState};

#[derive(Debug, Deserialize)]
pub struct CustomScanRequest {
    port: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MonitoringRequest {
    #[serde(alias = "monitorEnabled")]
    monitor_enabled: Option<bool>,
}

/// GET /api/devices/:id/ports
pub async fn list_ports(
    State(state): State<ApiState>,
    Path(device_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let ports = state.ports.list(device_id).await?;
    Ok(Json(json!({ "success": true, "ports": ports })))
}

/// POST /api/devices/:id/ports/scan
///
/// Probes every known port once and persists the results
pub async fn scan_known_ports(
    State(state): State<ApiState>,
    Path(device_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let result = state.ports.scan_known(device_id).await?;
    Ok(Json(json!({
        "success": true,
        "scannedAt": result.scanned_at,
        "openPorts": result.open_ports,
        "ports": result.ports,
    })))
}

/// POST /api/devices/:id/ports/scan-custom
pub async fn scan_custom_port(
    State(state): State<ApiState>,
    Path(device_id): Path<i64>,
    payload: Result<Json<CustomScanRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let port = request
        .port
        .ok_or_else(|| ApiError::InvalidRequest("port is required".to_string()))?;

    let result = state.ports.scan_custom(device_id, port).await?;
    Ok(Json(json!({
        "success": true,
        "scannedAt": result.scanned_at,
        "openPorts": result.open_ports,
        "ports": result.ports,
    })))
}

/// PATCH /api/devices/:id/ports/:port
pub async fn set_port_monitoring(
    State(state): State<ApiState>,
    Path((device_id, port)): Path<(i64, i64)>,
    payload: Result<Json<MonitoringRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let enabled = request
        .monitor_enabled
        .ok_or_else(|| ApiError::InvalidRequest("monitor_enabled must be a boolean".to_string()))?;

    let ports = state.ports.set_monitoring(device_id, port, enabled).await?;
    Ok(Json(json!({ "success": true, "ports": ports })))
}

/// DELETE /api/devices/:id/ports/:port
pub async fn delete_port(
    State(state): State<ApiState>,
    Path((device_id, port)): Path<(i64, i64)>,
) -> ApiResult<Json<Value>> {
    let ports = state.ports.delete(device_id, port).await?;
    Ok(Json(json!({ "success": true, "ports": ports })))
}
