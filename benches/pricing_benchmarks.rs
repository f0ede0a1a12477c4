use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal_macros::dec;
use storefront_api::entities::coupon;
use storefront_api::services::pricing::{compute_totals, recompute_after_cancel, PricedLine};
use uuid::Uuid;

fn make_lines(count: usize) -> Vec<PricedLine> {
    (0..count)
        .map(|i| PricedLine {
            product_id: Uuid::new_v4(),
            product_name: format!("product-{}", i),
            quantity: (i % 5) as i32 + 1,
            unit_price: dec!(19.99) + rust_decimal::Decimal::from(i as u32),
            discount_percent: if i % 3 == 0 { dec!(10) } else { dec!(0) },
        })
        .collect()
}

fn make_coupon() -> coupon::Model {
    coupon::Model {
        id: Uuid::new_v4(),
        code: "SAVE10".into(),
        discount_percentage: dec!(10),
        max_discount_amount: Some(dec!(100)),
        min_order_value: dec!(50),
        usage_limit: 1000,
        used_count: 0,
        is_active: true,
        expiration_date: Utc::now() + Duration::days(30),
        created_at: Utc::now(),
        updated_at: None,
    }
}

fn bench_compute_totals(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_totals");
    let now = Utc::now();
    let coupon = make_coupon();

    for &size in &[1usize, 10, 100] {
        let lines = make_lines(size);
        group.bench_with_input(BenchmarkId::new("no_coupon", size), &lines, |b, lines| {
            b.iter(|| compute_totals(black_box(lines), dec!(18), dec!(20), None, now).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("with_coupon", size), &lines, |b, lines| {
            b.iter(|| {
                compute_totals(black_box(lines), dec!(18), dec!(20), Some(&coupon), now).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_recompute_after_cancel(c: &mut Criterion) {
    c.bench_function("recompute_after_cancel", |b| {
        b.iter(|| {
            recompute_after_cancel(
                black_box(dec!(840.50)),
                black_box(dec!(100)),
                dec!(18),
                dec!(20),
            )
        })
    });
}

criterion_group!(benches, bench_compute_totals, bench_recompute_after_cancel);
criterion_main!(benches);
