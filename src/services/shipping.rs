use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::models::{Order, PaymentMethod};

const PICKUP_LOCATION: &str = "Primary";
const CHANNEL_ID: &str = "OYIEE_WEB";
const CONTACT_EMAIL: &str = "customer@oyiee.com";
const COUNTRY: &str = "India";
const APPAREL_HSN: &str = "61091000";

/// Outcome of a shipment booking. `raw` is kept on the order for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentReceipt {
    pub tracking_id: Option<String>,
    pub raw: Value,
}

impl ShipmentReceipt {
    /// Placeholder recorded when the provider call failed.
    pub fn failed(reason: &str) -> Self {
        Self {
            tracking_id: None,
            raw: json!({ "error": reason }),
        }
    }
}

#[async_trait]
pub trait ShippingProvider: Send + Sync {
    async fn create_shipment(&self, order: &Order) -> Result<ShipmentReceipt, ServiceError>;
}

#[derive(Debug, Default, Clone)]
pub struct DisabledShipping;

#[async_trait]
impl ShippingProvider for DisabledShipping {
    async fn create_shipment(&self, _order: &Order) -> Result<ShipmentReceipt, ServiceError> {
        Err(ServiceError::UpstreamUnavailable(
            "shipping provider is not configured".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct ShipmentLine {
    name: String,
    sku: String,
    units: u32,
    selling_price: f64,
    discount: &'static str,
    tax: String,
    hsn: &'static str,
}

#[derive(Debug, Serialize)]
struct ShipmentPayload {
    order_number: String,
    order_date: String,
    pickup_location: &'static str,
    channel_id: &'static str,
    comment: String,
    billing_customer_name: String,
    billing_last_name: String,
    billing_address: String,
    billing_address_2: &'static str,
    billing_city: String,
    billing_pincode: String,
    billing_state: String,
    billing_country: &'static str,
    billing_email: &'static str,
    billing_phone: String,
    shipping_is_billing: bool,
    shipping_customer_name: String,
    shipping_last_name: String,
    shipping_address: String,
    shipping_address_2: &'static str,
    shipping_city: String,
    shipping_pincode: String,
    shipping_state: String,
    shipping_country: &'static str,
    shipping_email: &'static str,
    shipping_phone: String,
    order_items: Vec<ShipmentLine>,
    payment_method: &'static str,
    shipping_charges: f64,
    giftwrap_charges: f64,
    transaction_charges: f64,
    total_discount: f64,
    sub_total: f64,
    length: f64,
    breadth: f64,
    height: f64,
    weight: f64,
}

/// Splits "First Rest Of Name" into ("First", "Rest Of Name").
fn split_name(full: &str) -> (String, String) {
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or(full).to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

impl ShipmentPayload {
    fn from_order(order: &Order) -> Self {
        let customer = &order.customer;
        let address = &customer.address;
        let (first_name, last_name) = split_name(&customer.name);
        let tax_percent = if order.pricing.subtotal.is_zero() {
            "0".to_string()
        } else {
            (order.pricing.tax / order.pricing.subtotal * Decimal::ONE_HUNDRED)
                .round()
                .to_string()
        };
        let (payment_method, comment) = match order.payment_method {
            PaymentMethod::Cod => ("COD", "OYIEE Fashion Order - COD"),
            PaymentMethod::Prepaid => ("prepaid", "OYIEE Fashion Order - Prepaid"),
        };

        Self {
            order_number: order.order_id.clone(),
            order_date: order.created_at.format("%Y-%m-%d").to_string(),
            pickup_location: PICKUP_LOCATION,
            channel_id: CHANNEL_ID,
            comment: comment.to_string(),
            billing_customer_name: first_name.clone(),
            billing_last_name: last_name.clone(),
            billing_address: address.street.clone(),
            billing_address_2: "",
            billing_city: address.city.clone(),
            billing_pincode: address.pincode.clone(),
            billing_state: address.state.clone(),
            billing_country: COUNTRY,
            billing_email: CONTACT_EMAIL,
            billing_phone: customer.phone.clone(),
            shipping_is_billing: true,
            shipping_customer_name: first_name,
            shipping_last_name: last_name,
            shipping_address: address.street.clone(),
            shipping_address_2: "",
            shipping_city: address.city.clone(),
            shipping_pincode: address.pincode.clone(),
            shipping_state: address.state.clone(),
            shipping_country: COUNTRY,
            shipping_email: CONTACT_EMAIL,
            shipping_phone: customer.phone.clone(),
            order_items: order
                .items
                .iter()
                .enumerate()
                .map(|(index, item)| ShipmentLine {
                    name: item.name.clone(),
                    sku: item
                        .sku
                        .clone()
                        .unwrap_or_else(|| format!("OYIEE-{}", index + 1)),
                    units: item.quantity,
                    selling_price: item.price.to_f64().unwrap_or_default(),
                    discount: "0",
                    tax: tax_percent.clone(),
                    hsn: APPAREL_HSN,
                })
                .collect(),
            payment_method,
            shipping_charges: order.pricing.shipping.to_f64().unwrap_or_default(),
            giftwrap_charges: 0.0,
            transaction_charges: 0.0,
            total_discount: 0.0,
            sub_total: order.total_amount.to_f64().unwrap_or_default(),
            length: 25.0,
            breadth: 20.0,
            height: 5.0,
            weight: 0.5,
        }
    }
}

/// NimbusPost shipment booking client.
#[derive(Clone)]
pub struct NimbusPostClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    client_id: String,
    timeout: Duration,
}

impl std::fmt::Debug for NimbusPostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NimbusPostClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl NimbusPostClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client_id: client_id.into(),
            timeout,
        })
    }

    async fn post_shipment(&self, order: &Order) -> Result<ShipmentReceipt, ServiceError> {
        let payload = ShipmentPayload::from_order(order);
        let response = self
            .http
            .post(format!("{}/v1/shipments", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Client-ID", &self.client_id)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(format!("shipping provider: {e}")))?;

        let status = response.status();
        let raw: Value = match response.json().await {
            Ok(value) => value,
            Err(_) => json!({ "error": "Invalid response from shipping provider" }),
        };
        if !status.is_success() {
            warn!(%status, response = %raw, "shipping provider rejected shipment");
            return Ok(ShipmentReceipt {
                tracking_id: None,
                raw,
            });
        }

        let tracking_id = raw
            .pointer("/data/awb_number")
            .and_then(|awb| match awb {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        Ok(ShipmentReceipt { tracking_id, raw })
    }
}

#[async_trait]
impl ShippingProvider for NimbusPostClient {
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn create_shipment(&self, order: &Order) -> Result<ShipmentReceipt, ServiceError> {
        let receipt = tokio::time::timeout(self.timeout, self.post_shipment(order))
            .await
            .map_err(|_| {
                ServiceError::UpstreamUnavailable("shipping provider timed out".to_string())
            })??;
        info!(tracking_id = ?receipt.tracking_id, "shipment booked");
        Ok(receipt)
    }
}
