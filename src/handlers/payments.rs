use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use super::json_body;
use crate::errors::ServiceError;
use crate::services::orders::{ConfirmPaymentRequest, PaymentConfirmation};
use crate::{ApiResponse, AppState};

/// POST /api/payments/confirm
///
/// Accepts the checkout widget's `razorpay_*` field names as well as
/// `orderRef`/`paymentRef`/`signature`.
pub async fn confirm_payment(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<PaymentConfirmation>>, ServiceError> {
    let request = json_body(payload)?;
    let confirmation = state.orders.confirm_payment(request).await?;
    Ok(Json(ApiResponse::with_message(
        confirmation,
        "Payment confirmed",
    )))
}
