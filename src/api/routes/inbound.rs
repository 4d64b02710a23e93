//! Inbound message submission

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::api::{ApiResult, ApiState};
use crate::inbound::InboundMessage;

/// POST /api/inbound/messages
///
/// Answers 202: the jobs are queued, not delivered
pub async fn submit_message(
    State(state): State<ApiState>,
    payload: Result<Json<InboundMessage>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(message) = payload?;
    let receipt = state.inbound.submit(message).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "bot_id": receipt.bot_id,
            "bot_name": receipt.bot_name,
            "deduplicated": receipt.deduplicated,
            "queued": receipt.queued,
            "notification_ids": receipt.notification_ids,
        })),
    ))
}
