use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::json_body;
use crate::errors::ServiceError;
use crate::models::{CreateOrderRequest, OrderView, PaymentMethod};
use crate::services::orders::CreateOrderResponse;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct OrderStatusQuery {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderEnvelope {
    pub order: OrderView,
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreateOrderResponse>>), ServiceError> {
    let request = json_body(payload)?;
    let created = state.orders.create_order(request, None).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(created, "Order created successfully")),
    ))
}

/// POST /api/orders/cod; the payment method is always COD.
pub async fn create_cod_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreateOrderResponse>>), ServiceError> {
    let request = json_body(payload)?;
    let created = state
        .orders
        .create_order(request, Some(PaymentMethod::Cod))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(created, "Order created successfully")),
    ))
}

/// GET /api/orders/{order_id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<OrderEnvelope>>, ServiceError> {
    let order = state.orders.get_order(&order_id).await?;
    Ok(Json(ApiResponse::success(OrderEnvelope { order })))
}

/// GET /api/order-status?orderId=
pub async fn order_status(
    State(state): State<AppState>,
    Query(query): Query<OrderStatusQuery>,
) -> Result<Json<ApiResponse<OrderEnvelope>>, ServiceError> {
    let order_id = query
        .order_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServiceError::MissingFields("Missing orderId parameter".to_string()))?;
    let order = state.orders.get_order(&order_id).await?;
    Ok(Json(ApiResponse::success(OrderEnvelope { order })))
}
