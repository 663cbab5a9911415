#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use storefront_api::{
    errors::ServiceError,
    logging::AccessLog,
    models::Order,
    services::payment_gateway::{PaymentGateway, PaymentIntent, PaymentIntentRequest},
    services::payments::PaymentVerifier,
    services::pricing::PricingPolicy,
    services::shipping::{ShipmentReceipt, ShippingProvider},
    store::{MemoryBackend, StoreBackend, StoreError},
    AppState, Collaborators,
};
use tower::ServiceExt;

pub const SIGNING_SECRET: &str = "test_signing_secret_for_checkout";
pub const GATEWAY_KEY_ID: &str = "rzp_test_key";

/// Payment gateway double handing out sequential gateway order ids.
#[derive(Default)]
pub struct StubGateway {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(ServiceError::UpstreamUnavailable(
                "gateway returned 500".to_string(),
            ));
        }
        Ok(PaymentIntent {
            gateway_order_id: format!("order_TEST{n:04}"),
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
        })
    }

    fn key_id(&self) -> Option<String> {
        Some(GATEWAY_KEY_ID.to_string())
    }
}

/// Shipping double; books `AWB{n}` or fails every call.
#[derive(Default)]
pub struct StubShipping {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ShippingProvider for StubShipping {
    async fn create_shipment(&self, order: &Order) -> Result<ShipmentReceipt, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(ServiceError::UpstreamUnavailable(
                "carrier returned 503".to_string(),
            ));
        }
        let awb = format!("AWB{n:06}");
        Ok(ShipmentReceipt {
            tracking_id: Some(awb.clone()),
            raw: json!({
                "status": true,
                "data": { "awb_number": awb, "order_id": order.order_id }
            }),
        })
    }
}

/// Memory backend with switches for failing upserts and for refusing
/// create-if-absent writes as if the key were taken.
pub struct SwitchableBackend {
    inner: Arc<MemoryBackend>,
    pub fail_updates: AtomicBool,
    pub reject_inserts: AtomicBool,
}

impl SwitchableBackend {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            fail_updates: AtomicBool::new(false),
            reject_inserts: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StoreBackend for SwitchableBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.insert_if_absent(key, value).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix).await
    }

    fn name(&self) -> &'static str {
        "switchable"
    }
}

#[derive(Default)]
pub struct TestOptions {
    pub gateway_fails: bool,
    pub shipping_fails: bool,
    pub without_verifier: bool,
}

/// Router over a fresh in-memory store with stubbed collaborators.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub backend: Arc<MemoryBackend>,
    /// Wraps `backend`; the services write through this.
    pub store: Arc<SwitchableBackend>,
    pub gateway: Arc<StubGateway>,
    pub shipping: Arc<StubShipping>,
    verifier: PaymentVerifier,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(SwitchableBackend::new(backend.clone()));
        let gateway = Arc::new(StubGateway {
            fail: options.gateway_fails,
            ..StubGateway::default()
        });
        let shipping = Arc::new(StubShipping {
            fail: options.shipping_fails,
            ..StubShipping::default()
        });
        let verifier = PaymentVerifier::new(SIGNING_SECRET);

        let state = AppState::new(
            store.clone(),
            Duration::from_secs(2),
            PricingPolicy::default(),
            Duration::from_secs(2),
            Collaborators {
                gateway: gateway.clone(),
                shipping: shipping.clone(),
                verifier: (!options.without_verifier).then(|| verifier.clone()),
            },
        );
        let router = storefront_api::app_router(state.clone(), AccessLog::discard());

        Self {
            router,
            state,
            backend,
            store,
            gateway,
            shipping,
            verifier,
        }
    }

    /// Send a request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a prebuilt request, for raw bodies and custom headers.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Like [`TestApp::request`], returning the status and the decoded body.
    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub fn sign(&self, order_ref: &str, payment_ref: &str) -> String {
        self.verifier
            .sign(order_ref, payment_ref)
            .expect("signing with a configured secret")
    }

    /// Places a COD order for the standard checkout and returns its id.
    pub async fn place_cod_order(&self) -> String {
        let (status, body) = self
            .call(Method::POST, "/api/orders", Some(checkout_payload()))
            .await;
        assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
        body["orderId"].as_str().expect("orderId").to_string()
    }

    /// Delivers an order through the carrier webhook.
    pub async fn deliver(&self, order_id: &str, delivery_date: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/webhooks/nimbus",
                Some(json!({
                    "orderNumber": order_id,
                    "currentStatus": "Delivered",
                    "deliveryDate": delivery_date
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
        body
    }

    pub async fn order(&self, order_id: &str) -> Value {
        let (status, body) = self
            .call(Method::GET, &format!("/api/orders/{order_id}"), None)
            .await;
        assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
        body["order"].clone()
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Shirt x2 at 399: 798 + 143.64 tax + 50 shipping = 991.64.
pub fn checkout_payload() -> Value {
    json!({
        "customerName": "Asha Rao",
        "phone": "9876543210",
        "address": "12 MG Road",
        "city": "Bengaluru",
        "state": "KA",
        "pincode": "560001",
        "items": [{ "name": "Shirt", "quantity": 2, "price": 399 }],
        "totalAmount": 991.64,
        "paymentMethod": "COD"
    })
}

pub fn prepaid_payload() -> Value {
    let mut payload = checkout_payload();
    payload["paymentMethod"] = json!("PREPAID");
    payload
}
