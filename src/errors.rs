use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

fn current_request_id() -> Option<String> {
    crate::middleware_helpers::request_id::current_request_id()
        .map(|rid| rid.as_str().to_string())
}

/// Error body returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always `false`; mirrors the `success` flag of successful bodies
    pub success: bool,
    /// Human-readable error description
    pub error: String,
    /// Stable machine-readable code (e.g. `amount_mismatch`)
    pub code: String,
    /// Field that failed validation, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error was produced
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Amount mismatch: declared {declared}, expected {computed}")]
    AmountMismatch { declared: Decimal, computed: Decimal },

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("Duplicate review: {0}")]
    DuplicateReview(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::StoreUnavailable(err.to_string())
    }
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. }
            | Self::MissingFields(_)
            | Self::AmountMismatch { .. }
            | Self::InvalidSignature
            | Self::NotEligible(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateReview(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::StoreUnavailable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::MissingFields(_) => "missing_fields",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::InvalidSignature => "invalid_signature",
            Self::NotFound(_) => "not_found",
            Self::NotEligible(_) => "not_eligible",
            Self::DuplicateReview(_) => "duplicate_review",
            Self::Conflict(_) => "conflict",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Store and upstream failures may succeed when the caller tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::UpstreamUnavailable(_)
        )
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::AmountMismatch { .. } => "Amount mismatch".to_string(),
            Self::StoreUnavailable(_) => "Storage temporarily unavailable".to_string(),
            Self::UpstreamUnavailable(_) => "Upstream service unavailable".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(msg)
            | Self::NotEligible(msg)
            | Self::DuplicateReview(msg)
            | Self::Conflict(msg)
            | Self::MissingFields(msg) => msg.clone(),
            Self::InvalidSignature => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let field = match &self {
            Self::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: self.response_message(),
            code: self.code().to_string(),
            field,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
