use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::order::CREATE_ORDER_FIELD_ORDER;
use crate::models::{
    CreateOrderRequest, Customer, Order, OrderItem, OrderStatus, OrderView, PaymentDetails,
    PaymentLink, PaymentMethod, ShippingAddress,
};
use crate::services::ids;
use crate::services::payment_gateway::{PaymentGateway, PaymentIntentRequest};
use crate::services::payments::PaymentVerifier;
use crate::services::pricing::{to_minor_units, PricingPolicy};
use crate::services::shipping::{ShipmentReceipt, ShippingProvider};
use crate::store::{KeyLockGuard, KeyedLocks, RecordStore};

pub const CURRENCY: &str = "INR";
const MAX_ID_ATTEMPTS: usize = 5;

/// Order records plus the per-order lock every read-modify-write goes through.
#[derive(Clone)]
pub struct OrderRepository {
    orders: RecordStore<Order>,
    locks: KeyedLocks,
}

impl OrderRepository {
    pub fn new(orders: RecordStore<Order>, locks: KeyedLocks) -> Self {
        Self { orders, locks }
    }

    pub async fn lock(&self, order_id: &str) -> KeyLockGuard {
        self.locks.lock(order_id).await
    }

    /// `Ok(None)` for ids that cannot exist as well as for absent records.
    pub async fn find(&self, order_id: &str) -> Result<Option<Order>, ServiceError> {
        if !ids::is_well_formed(order_id) {
            return Ok(None);
        }
        Ok(self.orders.get(order_id).await?)
    }

    pub async fn require(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.find(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    pub async fn save(&self, order: &Order) -> Result<(), ServiceError> {
        Ok(self.orders.set(&order.order_id, order).await?)
    }

    /// Returns false when the id is already taken.
    pub async fn insert_new(&self, order: &Order) -> Result<bool, ServiceError> {
        Ok(self.orders.insert_if_absent(&order.order_id, order).await?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    pub gateway_order_id: String,
    /// Amount in paise, as the checkout widget expects.
    pub amount: i64,
    pub currency: String,
    pub key_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub tracking_id: Option<String>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentInstructions>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfirmPaymentRequest {
    #[serde(alias = "razorpay_order_id")]
    pub order_ref: String,
    #[serde(alias = "razorpay_payment_id")]
    pub payment_ref: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub order_id: String,
    pub payment_id: String,
    pub status: OrderStatus,
    pub tracking_id: Option<String>,
}

/// Checks the request and returns the items to persist. Errors name the first
/// failing field in checkout form order.
pub fn validate_create_request(request: &CreateOrderRequest) -> Result<Vec<OrderItem>, ServiceError> {
    if let Err(errors) = request.validate() {
        let field_errors = errors.field_errors();
        for (field, wire_name) in CREATE_ORDER_FIELD_ORDER {
            let Some(errs) = field_errors.get(field).or_else(|| field_errors.get(wire_name)) else {
                continue;
            };
            // A missing value also fails its format check; report it as missing.
            let first = errs
                .iter()
                .find(|e| e.code == "length" || e.code == "required")
                .or_else(|| errs.first());
            let message = first
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid {wire_name}"));
            return Err(ServiceError::validation(wire_name, message));
        }
        return Err(ServiceError::validation("request", errors.to_string()));
    }
    if request.total_amount.is_none() {
        return Err(ServiceError::validation(
            "totalAmount",
            "Missing required field: totalAmount",
        ));
    }

    request
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let name = item.name.trim();
            if name.is_empty() {
                return Err(ServiceError::validation(
                    format!("items[{index}].name"),
                    "Item name is required",
                ));
            }
            if item.quantity < 1 || item.quantity > i64::from(u32::MAX) {
                return Err(ServiceError::validation(
                    format!("items[{index}].quantity"),
                    "Item quantity must be at least 1",
                ));
            }
            if item.price.is_sign_negative() && !item.price.is_zero() {
                return Err(ServiceError::validation(
                    format!("items[{index}].price"),
                    "Item price must not be negative",
                ));
            }
            Ok(OrderItem {
                name: name.to_string(),
                quantity: item.quantity as u32,
                price: item.price,
                sku: item.sku.clone().filter(|sku| !sku.trim().is_empty()),
            })
        })
        .collect()
}

/// Order creation, payment confirmation and the client-facing order view.
#[derive(Clone)]
pub struct OrderLifecycleService {
    repo: OrderRepository,
    payment_links: RecordStore<PaymentLink>,
    pricing: PricingPolicy,
    gateway: Arc<dyn PaymentGateway>,
    shipping: Arc<dyn ShippingProvider>,
    verifier: Option<PaymentVerifier>,
    upstream_timeout: Duration,
}

impl OrderLifecycleService {
    pub fn new(
        repo: OrderRepository,
        payment_links: RecordStore<PaymentLink>,
        pricing: PricingPolicy,
        gateway: Arc<dyn PaymentGateway>,
        shipping: Arc<dyn ShippingProvider>,
        verifier: Option<PaymentVerifier>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            payment_links,
            pricing,
            gateway,
            shipping,
            verifier,
            upstream_timeout,
        }
    }

    /// Validates, prices and persists a new order. `forced_method` overrides
    /// whatever the client sent (the COD-only endpoint).
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        forced_method: Option<PaymentMethod>,
    ) -> Result<CreateOrderResponse, ServiceError> {
        let items = validate_create_request(&request)?;
        let quote = self.pricing.quote(&items)?;
        let declared = request.total_amount.unwrap_or_default();
        self.pricing.check(declared, &quote)?;

        let payment_method = forced_method
            .or(request.payment_method)
            .unwrap_or_default();
        let now = Utc::now();
        let mut order = Order {
            order_id: String::new(),
            customer: Customer {
                name: request.customer_name.trim().to_string(),
                phone: request.phone.clone(),
                address: ShippingAddress {
                    street: request.address.trim().to_string(),
                    city: request.city.trim().to_string(),
                    state: request.state.trim().to_string(),
                    pincode: request.pincode.clone(),
                },
            },
            items,
            total_amount: quote.total,
            pricing: quote,
            payment_method,
            payment: None,
            status: OrderStatus::Created,
            tracking_id: None,
            shipment_response: None,
            tracking_updates: Vec::new(),
            delivered_at: None,
            can_review: false,
            has_review: false,
            review_id: None,
            created_at: now,
            last_updated: now,
        };

        match payment_method {
            PaymentMethod::Cod => self.create_cod(order).await,
            PaymentMethod::Prepaid => {
                order.status = OrderStatus::AwaitingPayment;
                self.create_prepaid(order).await
            }
        }
    }

    async fn create_cod(&self, mut order: Order) -> Result<CreateOrderResponse, ServiceError> {
        order.status = OrderStatus::Placed;
        let mut reserved = false;
        for _ in 0..MAX_ID_ATTEMPTS {
            order.order_id = ids::new_order_id();
            if self.repo.insert_new(&order).await? {
                reserved = true;
                break;
            }
            warn!(order_id = %order.order_id, "order id collision, retrying");
        }
        if !reserved {
            return Err(ServiceError::Internal(
                "could not allocate a unique order id".to_string(),
            ));
        }
        info!(order_id = %order.order_id, "COD order placed");

        let order = self.attach_shipment(order).await;
        Ok(CreateOrderResponse {
            order_id: order.order_id,
            tracking_id: order.tracking_id,
            status: order.status,
            payment_method: order.payment_method,
            payment: None,
        })
    }

    async fn create_prepaid(&self, mut order: Order) -> Result<CreateOrderResponse, ServiceError> {
        // The gateway is told the order id, so it has to be picked before the
        // intent exists; the create-if-absent write below still guards it.
        let mut candidate = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = ids::new_order_id();
            if self.repo.find(&id).await?.is_none() {
                candidate = Some(id);
                break;
            }
        }
        order.order_id = candidate.ok_or_else(|| {
            ServiceError::Internal("could not allocate a unique order id".to_string())
        })?;

        let intent = self
            .gateway
            .create_intent(&PaymentIntentRequest {
                order_id: order.order_id.clone(),
                amount_minor: to_minor_units(order.total_amount)?,
                currency: CURRENCY.to_string(),
                customer_name: order.customer.name.clone(),
                customer_phone: order.customer.phone.clone(),
            })
            .await?;

        order.payment = Some(PaymentDetails {
            gateway_order_id: intent.gateway_order_id.clone(),
            payment_id: None,
            paid_at: None,
        });
        let link = PaymentLink {
            gateway_order_id: intent.gateway_order_id.clone(),
            order_id: order.order_id.clone(),
        };
        if !ids::is_well_formed(&link.gateway_order_id) {
            return Err(ServiceError::UpstreamUnavailable(format!(
                "payment gateway returned an unusable order id: {}",
                link.gateway_order_id
            )));
        }
        if !self.repo.insert_new(&order).await? {
            return Err(ServiceError::Conflict(
                "order id already in use, please retry".to_string(),
            ));
        }
        self.payment_links.set(&link.gateway_order_id, &link).await?;
        info!(
            order_id = %order.order_id,
            gateway_order_id = %intent.gateway_order_id,
            "prepaid order awaiting payment"
        );

        Ok(CreateOrderResponse {
            order_id: order.order_id,
            tracking_id: None,
            status: order.status,
            payment_method: order.payment_method,
            payment: Some(PaymentInstructions {
                gateway_order_id: intent.gateway_order_id,
                amount: intent.amount_minor,
                currency: intent.currency,
                key_id: self.gateway.key_id(),
            }),
        })
    }

    /// Books a shipment for an already persisted order and records the
    /// outcome. Provider failures and timeouts are recorded, never returned.
    /// If the outcome cannot be written the order is returned as it was
    /// persisted before the booking.
    async fn attach_shipment(&self, order: Order) -> Order {
        let receipt = match tokio::time::timeout(
            self.upstream_timeout,
            self.shipping.create_shipment(&order),
        )
        .await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(err)) => {
                warn!(order_id = %order.order_id, error = %err, "shipment booking failed");
                ShipmentReceipt::failed(&err.to_string())
            }
            Err(_) => {
                warn!(order_id = %order.order_id, "shipment booking timed out");
                ShipmentReceipt::failed("shipping provider timed out")
            }
        };

        match self.record_shipment(&order.order_id, receipt).await {
            Ok(updated) => updated,
            Err(err) => {
                error!(order_id = %order.order_id, error = %err, "failed to record shipment outcome");
                order
            }
        }
    }

    async fn record_shipment(
        &self,
        order_id: &str,
        receipt: ShipmentReceipt,
    ) -> Result<Order, ServiceError> {
        let _guard = self.repo.lock(order_id).await;
        let mut current = self.repo.require(order_id).await?;
        current.adopt_tracking_id(receipt.tracking_id);
        current.shipment_response = Some(receipt.raw);
        current.touch();
        self.repo.save(&current).await?;
        Ok(current)
    }

    /// Applies a verified gateway callback: `AwaitingPayment -> Placed`, then
    /// books the shipment.
    #[instrument(skip(self, request), fields(order_ref = %request.order_ref, payment_ref = %request.payment_ref))]
    pub async fn confirm_payment(
        &self,
        request: ConfirmPaymentRequest,
    ) -> Result<PaymentConfirmation, ServiceError> {
        let verifier = self.verifier.as_ref().ok_or_else(|| {
            ServiceError::Internal("payment verification is not configured".to_string())
        })?;
        let order_ref = request.order_ref.trim();
        let payment_ref = request.payment_ref.trim().to_string();
        if !verifier.verify(order_ref, &payment_ref, request.signature.trim())? {
            warn!("payment signature rejected");
            return Err(ServiceError::InvalidSignature);
        }

        let link = if ids::is_well_formed(order_ref) {
            self.payment_links.get(order_ref).await?
        } else {
            None
        };
        let link =
            link.ok_or_else(|| ServiceError::NotFound("Payment reference not found".to_string()))?;

        let (order, newly_paid) = {
            let _guard = self.repo.lock(&link.order_id).await;
            let mut order = self.repo.require(&link.order_id).await?;
            let paid_with = order
                .payment
                .as_ref()
                .and_then(|payment| payment.payment_id.clone());
            let awaiting = order.status == OrderStatus::AwaitingPayment;
            match (awaiting, paid_with) {
                (true, _) => {
                    order.payment = Some(PaymentDetails {
                        gateway_order_id: link.gateway_order_id.clone(),
                        payment_id: Some(payment_ref.clone()),
                        paid_at: Some(Utc::now()),
                    });
                    order.status = OrderStatus::Placed;
                    order.touch();
                    self.repo.save(&order).await?;
                    info!(order_id = %order.order_id, "payment confirmed");
                    (order, true)
                }
                (_, Some(existing)) if existing == payment_ref => {
                    info!(order_id = %order.order_id, "payment confirmation replayed");
                    (order, false)
                }
                (_, Some(_)) => {
                    return Err(ServiceError::Conflict(
                        "Order was already paid with a different payment".to_string(),
                    ))
                }
                (_, None) => {
                    return Err(ServiceError::Conflict(
                        "Order is not awaiting payment".to_string(),
                    ))
                }
            }
        };

        let order = if newly_paid {
            self.attach_shipment(order).await
        } else {
            order
        };

        Ok(PaymentConfirmation {
            order_id: order.order_id,
            payment_id: payment_ref,
            status: order.status,
            tracking_id: order.tracking_id,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<OrderView, ServiceError> {
        Ok(self.repo.require(order_id.trim()).await?.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItemRequest;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            customer_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            address: "12 MG Road".into(),
            city: "Bengaluru".into(),
            state: "KA".into(),
            pincode: "560001".into(),
            items: vec![OrderItemRequest {
                name: "Shirt".into(),
                quantity: 2,
                price: dec!(399),
                sku: None,
            }],
            total_amount: Some(dec!(991.64)),
            payment_method: None,
        }
    }

    fn field_of(err: ServiceError) -> String {
        match err {
            ServiceError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_request_passes() {
        let items = validate_create_request(&request()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
    }

    #[test]
    fn first_failing_field_is_reported() {
        let mut req = request();
        req.customer_name.clear();
        req.pincode = "12".into();
        assert_eq!(field_of(validate_create_request(&req).unwrap_err()), "customerName");

        let mut req = request();
        req.city.clear();
        req.total_amount = None;
        assert_eq!(field_of(validate_create_request(&req).unwrap_err()), "city");

        let req = CreateOrderRequest::default();
        assert_eq!(field_of(validate_create_request(&req).unwrap_err()), "customerName");
    }

    #[test]
    fn missing_total_is_reported_after_the_other_fields() {
        let mut req = request();
        req.total_amount = None;
        assert_matches!(
            validate_create_request(&req),
            Err(ServiceError::Validation { field, message })
                if field == "totalAmount" && message == "Missing required field: totalAmount"
        );

        req.items.clear();
        assert_eq!(field_of(validate_create_request(&req).unwrap_err()), "items");
    }

    #[test]
    fn format_errors_carry_messages() {
        let mut req = request();
        req.phone = "12345".into();
        assert_matches!(
            validate_create_request(&req),
            Err(ServiceError::Validation { field, message })
                if field == "phone" && message == "Invalid phone number format"
        );

        let mut req = request();
        req.phone.clear();
        assert_matches!(
            validate_create_request(&req),
            Err(ServiceError::Validation { message, .. }) if message == "Missing required field: phone"
        );

        let mut req = request();
        req.pincode = "012345".into();
        assert_matches!(
            validate_create_request(&req),
            Err(ServiceError::Validation { field, message })
                if field == "pincode" && message == "Invalid pincode format"
        );
    }

    #[test]
    fn item_rules() {
        let mut req = request();
        req.items[0].quantity = 0;
        assert_eq!(
            field_of(validate_create_request(&req).unwrap_err()),
            "items[0].quantity"
        );

        let mut req = request();
        req.items[0].price = dec!(-1);
        assert_eq!(
            field_of(validate_create_request(&req).unwrap_err()),
            "items[0].price"
        );

        let mut req = request();
        req.items[0].name = "  ".into();
        assert_eq!(
            field_of(validate_create_request(&req).unwrap_err()),
            "items[0].name"
        );

        let mut req = request();
        req.items[0].price = Decimal::ZERO;
        assert!(validate_create_request(&req).is_ok());
    }
}
