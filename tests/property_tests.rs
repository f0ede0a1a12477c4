//! Property tests for the pricing arithmetic.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_api::entities::coupon;
use storefront_api::services::pricing::{compute_totals, recompute_after_cancel, PricedLine};
use uuid::Uuid;

fn arb_line() -> impl Strategy<Value = PricedLine> {
    (1..=20i32, 0..=100_000i64, 0..=100u32).prop_map(|(quantity, cents, discount)| PricedLine {
        product_id: Uuid::new_v4(),
        product_name: "prop".into(),
        quantity,
        unit_price: Decimal::new(cents, 2),
        discount_percent: Decimal::from(discount),
    })
}

fn arb_lines() -> impl Strategy<Value = Vec<PricedLine>> {
    proptest::collection::vec(arb_line(), 1..8)
}

fn arb_coupon() -> impl Strategy<Value = coupon::Model> {
    (1..=100u32, proptest::option::of(0..=50_000i64)).prop_map(|(pct, cap_cents)| coupon::Model {
        id: Uuid::new_v4(),
        code: "PROP".into(),
        discount_percentage: Decimal::from(pct),
        max_discount_amount: cap_cents.map(|c| Decimal::new(c, 2)),
        min_order_value: Decimal::ZERO,
        usage_limit: 100,
        used_count: 0,
        is_active: true,
        expiration_date: Utc::now() + Duration::days(7),
        created_at: Utc::now(),
        updated_at: None,
    })
}

proptest! {
    #[test]
    fn totals_are_deterministic(lines in arb_lines()) {
        let now = Utc::now();
        let a = compute_totals(&lines, dec!(18), dec!(20), None, now).unwrap();
        let b = compute_totals(&lines, dec!(18), dec!(20), None, now).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn net_is_never_negative(lines in arb_lines(), coupon in arb_coupon()) {
        let totals = compute_totals(&lines, dec!(18), dec!(20), Some(&coupon), Utc::now()).unwrap();
        prop_assert!(totals.net >= Decimal::ZERO);
    }

    #[test]
    fn discount_respects_subtotal_and_cap(lines in arb_lines(), coupon in arb_coupon()) {
        let totals = compute_totals(&lines, dec!(18), dec!(20), Some(&coupon), Utc::now()).unwrap();
        prop_assert!(totals.discount <= totals.subtotal);
        if let Some(cap) = coupon.max_discount_amount {
            prop_assert!(totals.discount <= cap);
        }
    }

    #[test]
    fn taxes_are_computed_on_the_pre_coupon_subtotal(lines in arb_lines(), coupon in arb_coupon()) {
        let now = Utc::now();
        let with = compute_totals(&lines, dec!(18), dec!(20), Some(&coupon), now).unwrap();
        let without = compute_totals(&lines, dec!(18), dec!(20), None, now).unwrap();
        prop_assert_eq!(with.taxes, without.taxes);
    }

    #[test]
    fn totals_balance_when_not_clamped(lines in arb_lines()) {
        let totals = compute_totals(&lines, dec!(18), dec!(20), None, Utc::now()).unwrap();
        prop_assert_eq!(
            totals.net,
            totals.subtotal - totals.discount + totals.taxes + totals.shipping
        );
    }

    #[test]
    fn recompute_clamps_and_balances(
        remaining_cents in 0..=1_000_000i64,
        discount_cents in 0..=1_000_000i64,
    ) {
        let remaining = Decimal::new(remaining_cents, 2);
        let original_discount = Decimal::new(discount_cents, 2);
        let totals = recompute_after_cancel(remaining, original_discount, dec!(18), dec!(20));
        prop_assert!(totals.discount <= remaining);
        prop_assert!(totals.net >= Decimal::ZERO);
        prop_assert_eq!(totals.shipping, dec!(20));
        prop_assert_eq!(
            totals.net,
            totals.subtotal - totals.discount + totals.taxes + totals.shipping
        );
    }

    #[test]
    fn subtotal_is_the_sum_of_line_totals(lines in arb_lines()) {
        let totals = compute_totals(&lines, dec!(0), dec!(0), None, Utc::now()).unwrap();
        let expected: Decimal = lines.iter().map(|l| l.line_total()).sum();
        prop_assert_eq!(totals.subtotal, expected);
    }
}
