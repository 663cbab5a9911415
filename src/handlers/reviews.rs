use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::json_body;
use crate::errors::ServiceError;
use crate::models::{Review, ReviewListing, ReviewQuery, SubmitReviewRequest};
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCreated {
    pub review_id: String,
    pub review: Review,
}

/// POST /api/reviews
pub async fn submit_review(
    State(state): State<AppState>,
    payload: Result<Json<SubmitReviewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ReviewCreated>>), ServiceError> {
    let request = json_body(payload)?;
    let review = state.reviews.submit_review(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            ReviewCreated {
                review_id: review.id.clone(),
                review,
            },
            "Review submitted successfully",
        )),
    ))
}

/// GET /api/reviews?productName=&rating=&limit=&offset=
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<ApiResponse<ReviewListing>>, ServiceError> {
    let listing = state.reviews.list_reviews(query).await?;
    Ok(Json(ApiResponse::success(listing)))
}
