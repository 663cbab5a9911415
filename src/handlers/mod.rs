pub mod health;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod webhooks;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use tracing::debug;

use crate::errors::ServiceError;

/// Unwraps a JSON body, reporting malformed input as a validation error
/// instead of axum's plain-text rejection.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "rejected request body");
            Err(ServiceError::validation(
                "body",
                "Request body must be a valid JSON object",
            ))
        }
    }
}
