//! HTTP handlers, grouped by resource. Routes are assembled in `lib.rs`.

pub mod cart;
pub mod checkout;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod wallet;

use crate::{
    cache::InMemoryCache,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        addresses::AddressService,
        catalog::CatalogService,
        checkout::CheckoutService,
        coupons::CouponService,
        invoices::InvoiceService,
        orders::{OrderLocks, OrderService},
        payments::{PaymentGateway, PaymentService},
        wallet::WalletService,
    },
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// All service instances, wired once at startup and cloned into handlers
/// through the router state.
#[derive(Clone)]
pub struct AppServices {
    pub coupons: Arc<CouponService>,
    pub catalog: Arc<CatalogService>,
    pub addresses: Arc<AddressService>,
    pub wallet: Arc<WalletService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub checkout: Arc<CheckoutService>,
    pub invoices: Arc<InvoiceService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        config: &AppConfig,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let locks = OrderLocks::new();
        let catalog = CatalogService::new(
            db.clone(),
            InMemoryCache::new(),
            config.catalog_cache_ttl(),
        );
        let coupons = CouponService::new(db.clone());
        let addresses = AddressService::new(db.clone());
        let wallet = WalletService::new(db.clone());
        let orders = OrderService::new(
            db.clone(),
            event_sender.clone(),
            catalog.clone(),
            wallet.clone(),
            locks.clone(),
        );
        let payments = PaymentService::new(
            db.clone(),
            event_sender.clone(),
            gateway,
            config.gateway_secret.clone(),
            config.gateway_timeout(),
            coupons.clone(),
            catalog.clone(),
            locks,
        );
        let tax_rate = Decimal::from_f64(config.default_tax_rate_percent).unwrap_or_default();
        let shipping = Decimal::from_f64(config.shipping_flat_fee).unwrap_or_default();
        let checkout = CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            catalog.clone(),
            coupons.clone(),
            addresses.clone(),
            wallet.clone(),
            payments.clone(),
            tax_rate,
            shipping,
            config.default_currency.clone(),
        );
        let invoices = InvoiceService::new(db.clone(), event_sender);

        Self {
            coupons: Arc::new(coupons),
            catalog: Arc::new(catalog),
            addresses: Arc::new(addresses),
            wallet: Arc::new(wallet),
            orders: Arc::new(orders),
            payments: Arc::new(payments),
            checkout: Arc::new(checkout),
            invoices: Arc::new(invoices),
        }
    }
}
