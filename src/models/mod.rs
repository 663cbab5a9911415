// Persisted records and request/response payloads
pub mod order;
pub mod review;

pub use order::{
    CreateOrderRequest, Customer, Order, OrderItem, OrderItemRequest, OrderStatus, OrderView,
    PaymentDetails, PaymentLink, PaymentMethod, PriceBreakdown, ShippingAddress, TrackingUpdate,
};
pub use review::{Pagination, Review, ReviewListing, ReviewQuery, ReviewStatistics, SubmitReviewRequest};
