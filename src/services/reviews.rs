use std::cmp::Reverse;

use chrono::Utc;
use tracing::{error, info, instrument};

use crate::errors::ServiceError;
use crate::models::review::MAX_COMMENT_CHARS;
use crate::models::{
    Pagination, Review, ReviewListing, ReviewQuery, ReviewStatistics, SubmitReviewRequest,
};
use crate::services::ids;
use crate::services::orders::OrderRepository;
use crate::store::RecordStore;

fn provided(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Verified reviews: one per delivered order.
#[derive(Clone)]
pub struct ReviewService {
    repo: OrderRepository,
    reviews: RecordStore<Review>,
}

impl ReviewService {
    pub fn new(repo: OrderRepository, reviews: RecordStore<Review>) -> Self {
        Self { repo, reviews }
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, rating = ?request.rating))]
    pub async fn submit_review(&self, request: SubmitReviewRequest) -> Result<Review, ServiceError> {
        let order_id = request.order_id.trim().to_string();
        if order_id.is_empty() {
            return Err(ServiceError::validation(
                "orderId",
                "Missing required field: orderId",
            ));
        }
        let rating = match request.rating {
            None => {
                return Err(ServiceError::validation(
                    "rating",
                    "Missing required field: rating",
                ))
            }
            Some(r) if (1..=5).contains(&r) => r as u8,
            Some(_) => {
                return Err(ServiceError::validation(
                    "rating",
                    "Rating must be between 1 and 5",
                ))
            }
        };
        let comment = request.comment.trim();
        if comment.is_empty() {
            return Err(ServiceError::validation(
                "comment",
                "Missing required field: comment",
            ));
        }
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(ServiceError::validation(
                "comment",
                format!("Comment must be at most {MAX_COMMENT_CHARS} characters"),
            ));
        }

        // Serializes with carrier webhooks touching the same order.
        let _guard = self.repo.lock(&order_id).await;
        let mut order = self.repo.require(&order_id).await?;
        if !order.review_eligible() {
            return Err(ServiceError::NotEligible(
                "Can only review delivered orders".to_string(),
            ));
        }
        if order.has_review {
            return Err(ServiceError::DuplicateReview(
                "Review already exists for this order".to_string(),
            ));
        }

        let review = Review {
            id: ids::new_review_id(),
            order_id: order_id.clone(),
            rating,
            comment: comment.to_string(),
            image_url: provided(&request.image_url),
            customer_name: provided(&request.customer_name)
                .or_else(|| Some(order.customer.name.clone()).filter(|n| !n.trim().is_empty()))
                .unwrap_or_else(|| "Anonymous".to_string()),
            product_name: provided(&request.product_name)
                .or_else(|| order.items.first().map(|item| item.name.clone()))
                .unwrap_or_else(|| "Product".to_string()),
            created_at: Utc::now(),
            verified: true,
        };

        if !self.reviews.insert_if_absent(&order_id, &review).await? {
            return Err(ServiceError::DuplicateReview(
                "Review already exists for this order".to_string(),
            ));
        }
        info!(review_id = %review.id, "review stored");

        order.has_review = true;
        order.review_id = Some(review.id.clone());
        order.touch();
        if let Err(err) = self.repo.save(&order).await {
            // The review record is authoritative for duplicates; the order
            // flag catches up on the next write.
            error!(error = %err, review_id = %review.id, "failed to link review to order");
        }

        Ok(review)
    }

    #[instrument(skip(self))]
    pub async fn list_reviews(&self, query: ReviewQuery) -> Result<ReviewListing, ServiceError> {
        let product = query.product_filter();
        let rating = query.rating_filter();
        let limit = query.page_limit();
        let offset = query.page_offset();

        let mut reviews: Vec<Review> = self
            .reviews
            .load_all()
            .await?
            .into_iter()
            .filter(|review| {
                product
                    .as_deref()
                    .map_or(true, |p| review.product_name.to_lowercase().contains(p))
            })
            .filter(|review| rating.map_or(true, |r| review.rating == r))
            .collect();
        reviews.sort_by_key(|review| Reverse(review.created_at));

        let statistics = ReviewStatistics::from_reviews(&reviews);
        let total = reviews.len();
        let page = reviews.into_iter().skip(offset).take(limit).collect();

        Ok(ReviewListing {
            reviews: page,
            pagination: Pagination {
                total,
                limit,
                offset,
                has_more: offset + limit < total,
            },
            statistics,
        })
    }
}
