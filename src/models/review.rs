use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_COMMENT_CHARS: usize = 2000;
pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

/// A verified review, stored under `review-{orderId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub order_id: String,
    pub rating: u8,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub customer_name: String,
    pub product_name: String,
    pub created_at: DateTime<Utc>,
    pub verified: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitReviewRequest {
    pub order_id: String,
    pub rating: Option<i64>,
    pub comment: String,
    pub image_url: Option<String>,
    pub customer_name: Option<String>,
    pub product_name: Option<String>,
}

/// Query string of the review listing. Values are taken leniently: an
/// unparseable rating is ignored, bad paging values fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewQuery {
    pub product_name: Option<String>,
    pub rating: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ReviewQuery {
    /// Rating filter, applied only for 1..=5.
    pub fn rating_filter(&self) -> Option<u8> {
        self.rating
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u8>().ok())
            .filter(|rating| (1..=5).contains(rating))
    }

    pub fn page_limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|limit| limit.clamp(1, MAX_PAGE_LIMIT as i64) as usize)
            .unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    pub fn page_offset(&self) -> usize {
        self.offset
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|offset| offset.max(0) as usize)
            .unwrap_or(0)
    }

    pub fn product_filter(&self) -> Option<String> {
        self.product_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatistics {
    pub total_reviews: usize,
    /// Mean rating rounded to one decimal, 0 when there are no reviews.
    pub average_rating: f64,
    pub rating_distribution: BTreeMap<u8, usize>,
}

impl ReviewStatistics {
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let mut rating_distribution: BTreeMap<u8, usize> = (1..=5).map(|r| (r, 0)).collect();
        let mut sum: u64 = 0;
        for review in reviews {
            *rating_distribution.entry(review.rating).or_insert(0) += 1;
            sum += u64::from(review.rating);
        }
        let average_rating = if reviews.is_empty() {
            0.0
        } else {
            ((sum as f64 / reviews.len() as f64) * 10.0).round() / 10.0
        };
        Self {
            total_reviews: reviews.len(),
            average_rating,
            rating_distribution,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewListing {
    pub reviews: Vec<Review>,
    pub pagination: Pagination,
    pub statistics: ReviewStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(rating: Option<&str>, limit: Option<&str>, offset: Option<&str>) -> ReviewQuery {
        ReviewQuery {
            product_name: None,
            rating: rating.map(str::to_string),
            limit: limit.map(str::to_string),
            offset: offset.map(str::to_string),
        }
    }

    #[test]
    fn rating_filter_only_in_range() {
        assert_eq!(query(Some("4"), None, None).rating_filter(), Some(4));
        assert_eq!(query(Some("0"), None, None).rating_filter(), None);
        assert_eq!(query(Some("6"), None, None).rating_filter(), None);
        assert_eq!(query(Some("abc"), None, None).rating_filter(), None);
    }

    #[test]
    fn paging_is_clamped() {
        assert_eq!(query(None, None, None).page_limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(query(None, Some("0"), None).page_limit(), 1);
        assert_eq!(query(None, Some("5000"), None).page_limit(), MAX_PAGE_LIMIT);
        assert_eq!(query(None, None, Some("-3")).page_offset(), 0);
        assert_eq!(query(None, None, Some("20")).page_offset(), 20);
    }

    #[test]
    fn statistics_round_to_one_decimal() {
        let now = Utc::now();
        let reviews: Vec<Review> = [5u8, 4, 4]
            .iter()
            .enumerate()
            .map(|(i, rating)| Review {
                id: format!("REV{i}"),
                order_id: format!("OYI{i}"),
                rating: *rating,
                comment: "ok".into(),
                image_url: None,
                customer_name: "A".into(),
                product_name: "Shirt".into(),
                created_at: now,
                verified: true,
            })
            .collect();
        let stats = ReviewStatistics::from_reviews(&reviews);
        assert_eq!(stats.total_reviews, 3);
        assert_eq!(stats.average_rating, 4.3);
        assert_eq!(stats.rating_distribution[&4], 2);
        assert_eq!(stats.rating_distribution[&1], 0);

        let empty = ReviewStatistics::from_reviews(&[]);
        assert_eq!(empty.average_rating, 0.0);
        assert_eq!(empty.rating_distribution.len(), 5);
    }
}
