use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Liveness probe; does not touch the store.
pub async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
