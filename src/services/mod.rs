// Identifiers and pricing
pub mod ids;
pub mod pricing;

// Payments
pub mod payment_gateway;
pub mod payments;

// Fulfillment
pub mod shipping;

// Order lifecycle, carrier events and reviews
pub mod orders;
pub mod reviews;
pub mod webhooks;
