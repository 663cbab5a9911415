use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::errors::ServiceError;
use crate::models::{OrderStatus, TrackingUpdate};
use crate::services::orders::OrderRepository;

/// Carrier status event. The carrier posts snake_case; camelCase is accepted
/// for manual replays.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CarrierEvent {
    #[serde(rename = "orderNumber", alias = "order_number")]
    pub order_number: Option<String>,
    #[serde(rename = "currentStatus", alias = "current_status")]
    pub current_status: Option<String>,
    #[serde(rename = "previousStatus", alias = "previous_status")]
    pub previous_status: Option<String>,
    #[serde(rename = "updatedAt", alias = "updated_at")]
    pub updated_at: Option<String>,
    #[serde(rename = "deliveryDate", alias = "delivery_date")]
    pub delivery_date: Option<String>,
    pub remarks: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "awbNumber", alias = "awb_number")]
    pub awb_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub order_number: String,
    pub new_status: String,
    pub can_review: bool,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Applies carrier events to orders.
#[derive(Clone)]
pub struct WebhookIngestor {
    repo: OrderRepository,
}

impl WebhookIngestor {
    pub fn new(repo: OrderRepository) -> Self {
        Self { repo }
    }

    /// Replays append another tracking entry but never move `deliveredAt` or
    /// `canReview` backwards.
    #[instrument(skip(self, event), fields(order_number = ?event.order_number, status = ?event.current_status))]
    pub async fn ingest(&self, event: CarrierEvent) -> Result<WebhookAck, ServiceError> {
        let (order_number, current_status) =
            match (non_blank(&event.order_number), non_blank(&event.current_status)) {
                (Some(number), Some(status)) => (number, status),
                _ => {
                    return Err(ServiceError::MissingFields(
                        "Missing required webhook data".to_string(),
                    ))
                }
            };

        let _guard = self.repo.lock(&order_number).await;
        let mut order = self.repo.require(&order_number).await?;
        let now = Utc::now();

        order.status = OrderStatus::from(current_status.clone());
        order.tracking_updates.push(TrackingUpdate {
            status: current_status.clone(),
            previous_status: non_blank(&event.previous_status),
            timestamp: non_blank(&event.updated_at),
            delivery_date: non_blank(&event.delivery_date),
            remarks: event.remarks.clone(),
            location: event.location.clone(),
            received_at: now,
        });
        order.adopt_tracking_id(non_blank(&event.awb_number));
        if order.status.is_delivered() {
            let delivered_at = non_blank(&event.delivery_date).unwrap_or_else(|| now.to_rfc3339());
            order.mark_delivered(delivered_at);
            info!(%order_number, "order delivered");
        }
        order.touch();
        self.repo.save(&order).await?;

        Ok(WebhookAck {
            order_number,
            new_status: current_status,
            can_review: order.can_review,
        })
    }
}
