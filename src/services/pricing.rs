//! Pure pricing engine.
//!
//! All arithmetic is exact `Decimal`; the same inputs always produce the
//! same totals. Monetary outputs are rounded to two decimal places.

use crate::entities::coupon;
use crate::errors::ServiceError;
use crate::services::coupons;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ONE_HUNDRED: Decimal = dec!(100);

/// A line being priced: catalog-sourced unit price and product discount,
/// never client-supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
}

impl PricedLine {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be at least 1 for product {}",
                self.product_id
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "unit price must not be negative for product {}",
                self.product_id
            )));
        }
        if self.discount_percent < Decimal::ZERO || self.discount_percent > ONE_HUNDRED {
            return Err(ServiceError::ValidationError(format!(
                "discount percent must be between 0 and 100 for product {}",
                self.product_id
            )));
        }
        Ok(())
    }

    /// Unit price after the product-level percentage discount.
    pub fn final_unit_price(&self) -> Decimal {
        (self.unit_price * (ONE_HUNDRED - self.discount_percent) / ONE_HUNDRED).round_dp(2)
    }

    pub fn line_total(&self) -> Decimal {
        self.final_unit_price() * Decimal::from(self.quantity)
    }
}

/// Order aggregates. `net = max(0, subtotal - discount + taxes + shipping)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub taxes: Decimal,
    pub shipping: Decimal,
    pub net: Decimal,
}

/// Compute order totals for a set of priced lines.
///
/// Taxes apply to the subtotal after product discounts but before any coupon
/// discount, at a single uniform rate. If a coupon is supplied it must be
/// applicable to the subtotal at `now`, otherwise this fails with
/// `CouponNotApplicable`.
pub fn compute_totals(
    lines: &[PricedLine],
    tax_rate_percent: Decimal,
    shipping_fee: Decimal,
    coupon: Option<&coupon::Model>,
    now: DateTime<Utc>,
) -> Result<Totals, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "cannot price an empty order".into(),
        ));
    }
    for line in lines {
        line.validate()?;
    }

    let subtotal: Decimal = lines.iter().map(|l| l.line_total()).sum();

    let discount = match coupon {
        Some(c) => {
            coupons::check_applicable(c, subtotal, now)?;
            coupons::compute_discount(c, subtotal)
        }
        None => Decimal::ZERO,
    };

    Ok(finish_totals(subtotal, discount, tax_rate_percent, shipping_fee))
}

/// Recompute aggregates after line cancellations. The discount is clamped to
/// the remaining subtotal rather than re-validated; shipping is unchanged.
pub fn recompute_after_cancel(
    remaining_subtotal: Decimal,
    original_discount: Decimal,
    tax_rate_percent: Decimal,
    shipping_fee: Decimal,
) -> Totals {
    let discount = original_discount.min(remaining_subtotal);
    finish_totals(remaining_subtotal, discount, tax_rate_percent, shipping_fee)
}

fn finish_totals(
    subtotal: Decimal,
    discount: Decimal,
    tax_rate_percent: Decimal,
    shipping_fee: Decimal,
) -> Totals {
    let taxes = (subtotal * tax_rate_percent / ONE_HUNDRED).round_dp(2);
    let net = (subtotal - discount + taxes + shipping_fee).max(Decimal::ZERO);
    Totals {
        subtotal,
        discount,
        taxes,
        shipping: shipping_fee,
        net,
    }
}
