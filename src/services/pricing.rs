use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::errors::ServiceError;
use crate::models::{OrderItem, PriceBreakdown};

/// Server-side price computation. The client's declared total is only ever
/// checked against this, never trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    pub shipping_fee: Decimal,
    pub tolerance: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.18),
            shipping_fee: dec!(50),
            tolerance: dec!(0.01),
        }
    }
}

impl PricingPolicy {
    /// Prices the items. Amounts too large to represent are reported against
    /// the item that overflowed, or against `items` for the totals.
    pub fn quote(&self, items: &[OrderItem]) -> Result<PriceBreakdown, ServiceError> {
        let mut subtotal = Decimal::ZERO;
        for (index, item) in items.iter().enumerate() {
            subtotal = item
                .line_total()
                .and_then(|line| subtotal.checked_add(line))
                .ok_or_else(|| too_large(format!("items[{index}].price")))?;
        }
        let tax = subtotal
            .checked_mul(self.tax_rate)
            .ok_or_else(|| too_large("items".to_string()))?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let shipping = self.shipping_fee;
        let total = subtotal
            .checked_add(tax)
            .and_then(|sum| sum.checked_add(shipping))
            .ok_or_else(|| too_large("items".to_string()))?;
        Ok(PriceBreakdown {
            subtotal,
            tax,
            shipping,
            total,
        })
    }

    /// Rejects a declared total more than `tolerance` away from the quote.
    pub fn check(&self, declared: Decimal, quote: &PriceBreakdown) -> Result<(), ServiceError> {
        let within = declared
            .checked_sub(quote.total)
            .map_or(false, |diff| diff.abs() <= self.tolerance);
        if !within {
            return Err(ServiceError::AmountMismatch {
                declared,
                computed: quote.total,
            });
        }
        Ok(())
    }
}

fn too_large(field: String) -> ServiceError {
    ServiceError::validation(field, "Order amount is too large")
}

/// Amount in the smallest currency unit (paise), as payment gateways expect.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    amount
        .checked_mul(dec!(100))
        .ok_or_else(|| ServiceError::Internal(format!("amount {amount} out of range")))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::Internal(format!("amount {amount} out of range")))
}
