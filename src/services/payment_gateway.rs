use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::errors::ServiceError;

/// What the gateway needs to open a payment for one order.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntentRequest {
    pub order_id: String,
    /// Amount in paise.
    pub amount_minor: i64,
    pub currency: String,
    pub customer_name: String,
    pub customer_phone: String,
}

/// The gateway's handle for an opened payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub gateway_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Public key the browser checkout widget is initialised with.
    fn key_id(&self) -> Option<String>;
}

/// Used when no gateway credentials are configured; PREPAID checkout then
/// fails with an upstream error while COD keeps working.
#[derive(Debug, Default, Clone)]
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_intent(
        &self,
        _request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        Err(ServiceError::UpstreamUnavailable(
            "payment gateway is not configured".to_string(),
        ))
    }

    fn key_id(&self) -> Option<String> {
        None
    }
}

#[derive(Serialize)]
struct RazorpayNotes<'a> {
    #[serde(rename = "orderId")]
    order_id: &'a str,
    #[serde(rename = "customerName")]
    customer_name: &'a str,
    #[serde(rename = "customerPhone")]
    customer_phone: &'a str,
}

#[derive(Serialize)]
struct RazorpayOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
    notes: RazorpayNotes<'a>,
}

#[derive(Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    currency: String,
}

/// Razorpay Orders API client.
#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    timeout: Duration,
}

impl std::fmt::Debug for RazorpayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayClient")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RazorpayClient {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            timeout,
        })
    }

    async fn post_order(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent, ServiceError> {
        let body = RazorpayOrderBody {
            amount: request.amount_minor,
            currency: &request.currency,
            receipt: &request.order_id,
            payment_capture: 1,
            notes: RazorpayNotes {
                order_id: &request.order_id,
                customer_name: &request.customer_name,
                customer_phone: &request.customer_phone,
            },
        };

        let response = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(format!("payment gateway: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(%status, %detail, "payment gateway rejected order creation");
            return Err(ServiceError::UpstreamUnavailable(format!(
                "payment gateway returned {status}"
            )));
        }

        let order: RazorpayOrder = response
            .json()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(format!("payment gateway: {e}")))?;
        Ok(PaymentIntent {
            gateway_order_id: order.id,
            amount_minor: order.amount,
            currency: order.currency,
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = request.amount_minor))]
    async fn create_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let intent = tokio::time::timeout(self.timeout, self.post_order(request))
            .await
            .map_err(|_| {
                ServiceError::UpstreamUnavailable("payment gateway timed out".to_string())
            })??;
        info!(gateway_order_id = %intent.gateway_order_id, "payment intent created");
        Ok(intent)
    }

    fn key_id(&self) -> Option<String> {
        Some(self.key_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn intent_request() -> PaymentIntentRequest {
        PaymentIntentRequest {
            order_id: "OYI1".into(),
            amount_minor: 99164,
            currency: "INR".into(),
            customer_name: "Asha Rao".into(),
            customer_phone: "9876543210".into(),
        }
    }

    #[tokio::test]
    async fn creates_order_with_basic_auth_and_notes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(basic_auth("rzp_test_key", "rzp_secret"))
            .and(body_partial_json(json!({
                "amount": 99164,
                "currency": "INR",
                "payment_capture": 1,
                "notes": {"orderId": "OYI1", "customerName": "Asha Rao", "customerPhone": "9876543210"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_gw_1",
                "amount": 99164,
                "currency": "INR",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RazorpayClient::new(
            server.uri(),
            "rzp_test_key",
            "rzp_secret",
            Duration::from_secs(2),
        )
        .unwrap();
        let intent = client.create_intent(&intent_request()).await.unwrap();
        assert_eq!(intent.gateway_order_id, "order_gw_1");
        assert_eq!(intent.amount_minor, 99164);
        assert_eq!(client.key_id().as_deref(), Some("rzp_test_key"));
    }

    #[tokio::test]
    async fn gateway_error_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": "BAD_REQUEST_ERROR", "description": "Authentication failed"}
            })))
            .mount(&server)
            .await;

        let client =
            RazorpayClient::new(server.uri(), "k", "s", Duration::from_secs(2)).unwrap();
        assert_matches!(
            client.create_intent(&intent_request()).await,
            Err(ServiceError::UpstreamUnavailable(_))
        );
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client =
            RazorpayClient::new(server.uri(), "k", "s", Duration::from_millis(50)).unwrap();
        assert_matches!(
            client.create_intent(&intent_request()).await,
            Err(ServiceError::UpstreamUnavailable(_))
        );
    }

    #[tokio::test]
    async fn disabled_gateway_refuses() {
        assert_matches!(
            DisabledGateway.create_intent(&intent_request()).await,
            Err(ServiceError::UpstreamUnavailable(_))
        );
        assert_eq!(DisabledGateway.key_id(), None);
    }
}
