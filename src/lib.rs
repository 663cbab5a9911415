//! Storefront API
//!
//! Order and fulfillment records for a small storefront: order creation and
//! pricing, payment confirmation, carrier webhooks and verified reviews.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod middleware_helpers;
pub mod models;
pub mod services;
pub mod store;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::logging::AccessLog;
use crate::services::orders::{OrderLifecycleService, OrderRepository};
use crate::services::payment_gateway::PaymentGateway;
use crate::services::payments::PaymentVerifier;
use crate::services::pricing::PricingPolicy;
use crate::services::reviews::ReviewService;
use crate::services::shipping::ShippingProvider;
use crate::services::webhooks::WebhookIngestor;
use crate::store::{
    KeyedLocks, RecordStore, StoreBackend, ORDER_PREFIX, PAYMENT_PREFIX, REVIEW_PREFIX,
};

/// Outbound collaborators of the order lifecycle.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub shipping: Arc<dyn ShippingProvider>,
    /// `None` when no signing secret is configured; confirmations then fail.
    pub verifier: Option<PaymentVerifier>,
}

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderLifecycleService>,
    pub webhooks: Arc<WebhookIngestor>,
    pub reviews: Arc<ReviewService>,
}

impl AppState {
    /// Wires every service onto one backend. All services share a single
    /// set of per-order locks.
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        store_timeout: Duration,
        pricing: PricingPolicy,
        upstream_timeout: Duration,
        collaborators: Collaborators,
    ) -> Self {
        let repo = OrderRepository::new(
            RecordStore::new(backend.clone(), ORDER_PREFIX, store_timeout),
            KeyedLocks::new(),
        );
        let orders = OrderLifecycleService::new(
            repo.clone(),
            RecordStore::new(backend.clone(), PAYMENT_PREFIX, store_timeout),
            pricing,
            collaborators.gateway,
            collaborators.shipping,
            collaborators.verifier,
            upstream_timeout,
        );
        let reviews = ReviewService::new(
            repo.clone(),
            RecordStore::new(backend, REVIEW_PREFIX, store_timeout),
        );

        Self {
            orders: Arc::new(orders),
            webhooks: Arc::new(WebhookIngestor::new(repo)),
            reviews: Arc::new(reviews),
        }
    }
}

/// Success envelope. The payload's fields sit next to `success`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: middleware_helpers::request_id::current_request_id()
                .map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }
}

/// Routes of the public API. Request ids are assigned before the access log
/// runs so every access line carries one.
pub fn app_router(state: AppState, access_log: Arc<AccessLog>) -> Router {
    let api = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/cod", post(handlers::orders::create_cod_order))
        .route("/orders/:order_id", get(handlers::orders::get_order))
        .route("/order-status", get(handlers::orders::order_status))
        .route("/payments/confirm", post(handlers::payments::confirm_payment))
        .route("/webhooks/nimbus", post(handlers::webhooks::nimbus_webhook))
        .route(
            "/reviews",
            post(handlers::reviews::submit_review).get(handlers::reviews::list_reviews),
        );

    Router::new()
        .route("/health", get(handlers::health::liveness_check))
        .nest("/api", api)
        .layer(axum::middleware::from_fn_with_state(
            access_log,
            logging::access_log_middleware,
        ))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
