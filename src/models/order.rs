use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Ten-digit Indian mobile number.
pub static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").unwrap());
/// Six-digit Indian postal code.
pub static PINCODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]{5}$").unwrap());

const STATUS_CREATED: &str = "Created";
const STATUS_AWAITING_PAYMENT: &str = "Awaiting Payment";
const STATUS_PLACED: &str = "Order Placed";

/// Lifecycle position of an order.
///
/// The first three states are owned by this service. Anything after that is
/// whatever text the carrier sent, stored verbatim; only "delivered"
/// (any case) carries meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Created,
    AwaitingPayment,
    Placed,
    Carrier(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => STATUS_CREATED,
            Self::AwaitingPayment => STATUS_AWAITING_PAYMENT,
            Self::Placed => STATUS_PLACED,
            Self::Carrier(status) => status,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.as_str().eq_ignore_ascii_case("delivered")
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            STATUS_CREATED => Self::Created,
            STATUS_AWAITING_PAYMENT => Self::AwaitingPayment,
            STATUS_PLACED => Self::Placed,
            _ => Self::Carrier(value),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Carrier(status) => status,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Prepaid,
    #[default]
    Cod,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepaid => "PREPAID",
            Self::Cod => "COD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub address: ShippingAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

impl OrderItem {
    /// `None` when price times quantity does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Server-side price computation persisted alongside the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub gateway_order_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// One carrier event as recorded on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<String>,
    /// Carrier-reported event time, verbatim.
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Persisted order record, stored under `order-{orderId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub pricing: PriceBreakdown,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentDetails>,
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_id: Option<String>,
    /// Raw shipping provider reply or error, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_response: Option<serde_json::Value>,
    #[serde(default)]
    pub tracking_updates: Vec<TrackingUpdate>,
    #[serde(default)]
    pub delivered_at: Option<String>,
    #[serde(default)]
    pub can_review: bool,
    #[serde(default)]
    pub has_review: bool,
    #[serde(default)]
    pub review_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Order {
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// A review may be written once the order was delivered.
    pub fn review_eligible(&self) -> bool {
        self.can_review || self.status.is_delivered()
    }

    /// First delivery wins; later calls keep the original date.
    pub fn mark_delivered(&mut self, delivered_at: String) {
        if self.delivered_at.is_none() {
            self.delivered_at = Some(delivered_at);
        }
        self.can_review = true;
    }

    /// Records the carrier's shipment number unless one is already set.
    pub fn adopt_tracking_id(&mut self, tracking_id: Option<String>) {
        if self.tracking_id.is_none() {
            self.tracking_id = tracking_id.filter(|awb| !awb.trim().is_empty());
        }
    }

    pub fn view(&self) -> OrderView {
        OrderView {
            order_id: self.order_id.clone(),
            status: self.status.clone(),
            customer: self.customer.clone(),
            items: self.items.clone(),
            pricing: self.pricing.clone(),
            total_amount: self.total_amount,
            payment_method: self.payment_method,
            payment_id: self
                .payment
                .as_ref()
                .and_then(|payment| payment.payment_id.clone()),
            tracking_id: self.tracking_id.clone(),
            tracking_updates: self.tracking_updates.clone(),
            delivered_at: self.delivered_at.clone(),
            can_review: self.can_review,
            has_review: self.has_review,
            review_id: self.review_id.clone(),
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }
}

/// What a customer may see of an order. Shipping diagnostics and gateway
/// identifiers other than the payment id stay server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: String,
    pub status: OrderStatus,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub pricing: PriceBreakdown,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub tracking_id: Option<String>,
    pub tracking_updates: Vec<TrackingUpdate>,
    pub delivered_at: Option<String>,
    pub can_review: bool,
    pub has_review: bool,
    pub review_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Index entry resolving a gateway order id back to the local order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
    pub gateway_order_id: String,
    pub order_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderItemRequest {
    pub name: String,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub sku: Option<String>,
}

/// Checkout payload. Every field defaults so that a missing one is reported
/// by name rather than as a JSON shape error.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrderRequest {
    #[serde(alias = "name")]
    #[validate(length(min = 1, message = "Missing required field: customerName"))]
    pub customer_name: String,

    #[validate(
        length(min = 1, message = "Missing required field: phone"),
        regex(path = "PHONE_RE", message = "Invalid phone number format")
    )]
    pub phone: String,

    #[validate(length(min = 1, message = "Missing required field: address"))]
    pub address: String,

    #[validate(length(min = 1, message = "Missing required field: city"))]
    pub city: String,

    #[validate(length(min = 1, message = "Missing required field: state"))]
    pub state: String,

    #[validate(
        length(min = 1, message = "Missing required field: pincode"),
        regex(path = "PINCODE_RE", message = "Invalid pincode format")
    )]
    pub pincode: String,

    #[validate(length(min = 1, message = "Missing required field: items"))]
    pub items: Vec<OrderItemRequest>,

    /// Checked by `validate_create_request`, after the fields above.
    #[serde(alias = "amount", with = "rust_decimal::serde::float_option")]
    pub total_amount: Option<Decimal>,

    #[serde(alias = "paymentMode")]
    pub payment_method: Option<PaymentMethod>,
}

/// Validated fields in the order they are reported, as (struct field, wire
/// name). `totalAmount` follows them.
pub const CREATE_ORDER_FIELD_ORDER: [(&str, &str); 7] = [
    ("customer_name", "customerName"),
    ("phone", "phone"),
    ("address", "address"),
    ("city", "city"),
    ("state", "state"),
    ("pincode", "pincode"),
    ("items", "items"),
];
