//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::api::{ApiResult, ApiState};

/// GET /api/health
///
/// 503 when the storage backend does not answer
pub async fn health_check(
    State(state): State<ApiState>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let health = state.storage.health_check().await?;

    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((
        status,
        Json(json!({
            "ok": health.healthy,
            "storage": {
                "message": health.message,
                "details": health.metadata,
            },
        })),
    ))
}
