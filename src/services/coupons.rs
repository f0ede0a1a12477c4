//! Coupon validation, selection and redemption.
//!
//! Codes are stored uppercase and matched case-insensitively. `used_count`
//! is only ever advanced through [`CouponService::redeem`], a single
//! conditional UPDATE that also enforces the usage limit.

use crate::{
    db::DbPool,
    entities::coupon::{self, Entity as CouponEntity},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const ONE_HUNDRED: Decimal = dec!(100);

/// Checks whether `coupon` can be applied to an order subtotal at `now`.
pub fn check_applicable(
    coupon: &coupon::Model,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !coupon.is_active {
        return Err(ServiceError::CouponNotApplicable(format!(
            "coupon {} is inactive",
            coupon.code
        )));
    }
    if now >= coupon.expiration_date {
        return Err(ServiceError::CouponNotApplicable(format!(
            "coupon {} has expired",
            coupon.code
        )));
    }
    if coupon.used_count >= coupon.usage_limit {
        return Err(ServiceError::CouponNotApplicable(format!(
            "coupon {} usage limit reached",
            coupon.code
        )));
    }
    if subtotal < coupon.min_order_value {
        return Err(ServiceError::CouponNotApplicable(format!(
            "order subtotal below the {} minimum for coupon {}",
            coupon.min_order_value, coupon.code
        )));
    }
    Ok(())
}

pub fn is_applicable(coupon: &coupon::Model, subtotal: Decimal, now: DateTime<Utc>) -> bool {
    check_applicable(coupon, subtotal, now).is_ok()
}

/// Discount for an applicable coupon: percentage of the subtotal, capped at
/// `max_discount_amount` when set.
pub fn compute_discount(coupon: &coupon::Model, subtotal: Decimal) -> Decimal {
    let raw = (subtotal * coupon.discount_percentage / ONE_HUNDRED).round_dp(2);
    match coupon.max_discount_amount {
        Some(cap) => raw.min(cap),
        None => raw,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub discount_percentage: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub min_order_value: Decimal,
    pub usage_limit: i32,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CouponService {
    db_pool: Arc<DbPool>,
}

impl CouponService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Look up a coupon by code, case-insensitively.
    #[instrument(skip(self))]
    pub async fn find_by_code(&self, code: &str) -> Result<coupon::Model, ServiceError> {
        let canonical = code.trim().to_uppercase();
        CouponEntity::find()
            .filter(coupon::Column::Code.eq(canonical.clone()))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", canonical)))
    }

    /// Best coupon for a given subtotal: the applicable coupon with the
    /// largest discount, ties broken by earliest expiration.
    #[instrument(skip(self))]
    pub async fn best_coupon(
        &self,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let candidates = CouponEntity::find()
            .filter(coupon::Column::IsActive.eq(true))
            .all(&*self.db_pool)
            .await?;

        let best = candidates
            .into_iter()
            .filter(|c| is_applicable(c, subtotal, now))
            .max_by(|a, b| {
                compute_discount(a, subtotal)
                    .cmp(&compute_discount(b, subtotal))
                    // on equal discount prefer the one expiring sooner
                    .then_with(|| b.expiration_date.cmp(&a.expiration_date))
            });
        Ok(best)
    }

    /// Atomically consume one use of a coupon inside the caller's
    /// transaction. Zero affected rows means the coupon is no longer
    /// redeemable and the caller must abort.
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let canonical = code.trim().to_uppercase();
        let result = CouponEntity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(coupon::Column::Code.eq(canonical.clone()))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::ExpirationDate.gt(now))
            .filter(
                Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::UsageLimit)),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::CouponNotApplicable(format!(
                "coupon {} can no longer be redeemed",
                canonical
            )));
        }
        Ok(())
    }

    /// Create a coupon. Admin-only at the HTTP layer.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        let code = input.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "coupon code must not be empty".into(),
            ));
        }
        if input.discount_percentage <= Decimal::ZERO || input.discount_percentage > ONE_HUNDRED {
            return Err(ServiceError::ValidationError(
                "discount percentage must be between 0 and 100".into(),
            ));
        }
        if let Some(cap) = input.max_discount_amount {
            if cap <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "max discount amount must be positive".into(),
                ));
            }
        }
        if input.min_order_value < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "minimum order value must not be negative".into(),
            ));
        }
        if input.usage_limit < 1 {
            return Err(ServiceError::ValidationError(
                "usage limit must be at least 1".into(),
            ));
        }
        if input.expiration_date <= Utc::now() {
            return Err(ServiceError::ValidationError(
                "expiration date must be in the future".into(),
            ));
        }

        let existing = CouponEntity::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(&*self.db_pool)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "coupon {} already exists",
                code
            )));
        }

        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_percentage: Set(input.discount_percentage),
            max_discount_amount: Set(input.max_discount_amount),
            min_order_value: Set(input.min_order_value),
            usage_limit: Set(input.usage_limit),
            used_count: Set(0),
            is_active: Set(true),
            expiration_date: Set(input.expiration_date),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(code = %code, "Coupon created");
        Ok(model)
    }

    /// List all coupons, newest first. Admin-only at the HTTP layer.
    pub async fn list_coupons(&self) -> Result<Vec<coupon::Model>, ServiceError> {
        Ok(CouponEntity::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn coupon(
        pct: Decimal,
        cap: Option<Decimal>,
        min_order: Decimal,
        expires_in_days: i64,
    ) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "TEST".into(),
            discount_percentage: pct,
            max_discount_amount: cap,
            min_order_value: min_order,
            usage_limit: 10,
            used_count: 0,
            is_active: true,
            expiration_date: Utc::now() + Duration::days(expires_in_days),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn discount_is_percentage_of_subtotal() {
        let c = coupon(dec!(10), None, dec!(0), 30);
        assert_eq!(compute_discount(&c, dec!(250)), dec!(25));
    }

    #[test]
    fn discount_is_capped() {
        let c = coupon(dec!(10), Some(dec!(100)), dec!(0), 30);
        assert_eq!(compute_discount(&c, dec!(1200)), dec!(100));
        assert_eq!(compute_discount(&c, dec!(500)), dec!(50));
    }

    #[test]
    fn inactive_coupon_not_applicable() {
        let mut c = coupon(dec!(10), None, dec!(0), 30);
        c.is_active = false;
        assert!(!is_applicable(&c, dec!(1000), Utc::now()));
    }

    #[test]
    fn expired_coupon_not_applicable() {
        let c = coupon(dec!(10), None, dec!(0), -1);
        assert!(!is_applicable(&c, dec!(1000), Utc::now()));
    }

    #[test]
    fn exhausted_coupon_not_applicable() {
        let mut c = coupon(dec!(10), None, dec!(0), 30);
        c.used_count = c.usage_limit;
        assert!(!is_applicable(&c, dec!(1000), Utc::now()));
    }

    #[test]
    fn subtotal_below_minimum_not_applicable() {
        let c = coupon(dec!(10), None, dec!(500), 30);
        assert!(!is_applicable(&c, dec!(499.99), Utc::now()));
        assert!(is_applicable(&c, dec!(500), Utc::now()));
    }

    #[test]
    fn applicability_error_names_the_reason() {
        let c = coupon(dec!(10), None, dec!(500), 30);
        let err = check_applicable(&c, dec!(100), Utc::now()).unwrap_err();
        assert_matches!(err, ServiceError::CouponNotApplicable(_));
    }
}
