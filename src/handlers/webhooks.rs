use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use super::json_body;
use crate::errors::ServiceError;
use crate::services::webhooks::{CarrierEvent, WebhookAck};
use crate::{ApiResponse, AppState};

/// POST /api/webhooks/nimbus
pub async fn nimbus_webhook(
    State(state): State<AppState>,
    payload: Result<Json<CarrierEvent>, JsonRejection>,
) -> Result<Json<ApiResponse<WebhookAck>>, ServiceError> {
    let event = json_body(payload)?;
    let ack = state.webhooks.ingest(event).await?;
    Ok(Json(ApiResponse::with_message(
        ack,
        "Order status updated successfully",
    )))
}
