//! Carrier webhook ingestion.

mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, TestOptions};
use serde_json::json;
use storefront_api::services::webhooks::CarrierEvent;

#[tokio::test]
async fn delivered_event_opens_reviews() {
    let app = TestApp::new();
    let order_id = app.place_cod_order().await;

    let ack = app.deliver(&order_id, "2025-01-10").await;

    assert_eq!(ack["success"], json!(true));
    assert_eq!(ack["orderNumber"], json!(order_id));
    assert_eq!(ack["newStatus"], json!("Delivered"));
    assert_eq!(ack["canReview"], json!(true));

    let order = app.order(&order_id).await;
    assert_eq!(order["status"], json!("Delivered"));
    assert_eq!(order["canReview"], json!(true));
    assert_eq!(order["deliveredAt"], json!("2025-01-10"));
    let updates = order["trackingUpdates"].as_array().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["status"], json!("Delivered"));
    assert_eq!(updates[0]["deliveryDate"], json!("2025-01-10"));
}

#[tokio::test]
async fn replayed_delivery_keeps_first_date() {
    let app = TestApp::new();
    let order_id = app.place_cod_order().await;

    app.deliver(&order_id, "2025-01-10").await;
    let ack = app.deliver(&order_id, "2025-02-01").await;

    assert_eq!(ack["canReview"], json!(true));
    let order = app.order(&order_id).await;
    assert_eq!(order["deliveredAt"], json!("2025-01-10"));
    assert_eq!(order["canReview"], json!(true));
    assert_eq!(order["trackingUpdates"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn delivery_status_match_is_case_insensitive() {
    let app = TestApp::new();
    let order_id = app.place_cod_order().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/webhooks/nimbus",
            Some(json!({ "order_number": order_id, "current_status": "DELIVERED" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let order = app.order(&order_id).await;
    assert_eq!(order["canReview"], json!(true));
    assert!(order["deliveredAt"].is_string());
}

#[tokio::test]
async fn in_transit_event_adopts_carrier_awb() {
    let app = TestApp::with_options(TestOptions {
        shipping_fails: true,
        ..TestOptions::default()
    });
    let order_id = app.place_cod_order().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/webhooks/nimbus",
            Some(json!({
                "order_number": order_id,
                "current_status": "In Transit",
                "previous_status": "Pickup Scheduled",
                "awb_number": "NMB777",
                "location": "Bengaluru Hub"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["canReview"], json!(false));
    let order = app.order(&order_id).await;
    assert_eq!(order["status"], json!("In Transit"));
    assert_eq!(order["trackingId"], json!("NMB777"));
    assert_eq!(order["deliveredAt"], json!(null));
    assert_eq!(order["trackingUpdates"][0]["previousStatus"], json!("Pickup Scheduled"));
    assert_eq!(order["trackingUpdates"][0]["location"], json!("Bengaluru Hub"));
}

#[tokio::test]
async fn booked_tracking_id_is_not_replaced() {
    let app = TestApp::new();
    let order_id = app.place_cod_order().await;

    app.call(
        Method::POST,
        "/api/webhooks/nimbus",
        Some(json!({
            "orderNumber": order_id,
            "currentStatus": "Shipped",
            "awbNumber": "OTHER1"
        })),
    )
    .await;

    assert_eq!(app.order(&order_id).await["trackingId"], json!("AWB000001"));
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let app = TestApp::new();

    for payload in [
        json!({ "currentStatus": "Delivered" }),
        json!({ "orderNumber": "OYI1", "currentStatus": "   " }),
        json!({}),
    ] {
        let (status, body) = app
            .call(Method::POST, "/api/webhooks/nimbus", Some(payload))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("missing_fields"));
        assert_eq!(body["error"], json!("Missing required webhook data"));
    }
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/webhooks/nimbus",
            Some(json!({
                "orderNumber": "OYI123",
                "currentStatus": "Delivered",
                "deliveryDate": "2025-01-10"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_events_are_all_recorded() {
    let app = TestApp::new();
    let order_id = app.place_cod_order().await;

    let handles: Vec<_> = (0..20)
        .map(|n| {
            let ingestor = app.state.webhooks.clone();
            let event = CarrierEvent {
                order_number: Some(order_id.clone()),
                current_status: Some(format!("Checkpoint {n}")),
                ..CarrierEvent::default()
            };
            tokio::spawn(async move { ingestor.ingest(event).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let order = app.order(&order_id).await;
    assert_eq!(order["trackingUpdates"].as_array().unwrap().len(), 20);
}
