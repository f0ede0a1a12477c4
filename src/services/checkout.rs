//! Cart operations and the checkout orchestrator.
//!
//! The cart stores product snapshots for display only; quoting and checkout
//! always re-read price, discount and stock from the catalog. Totals are
//! recomputed server-side immediately before any charge, so stale quotes
//! are never trusted.

use crate::{
    db::DbPool,
    entities::cart::{self, Entity as CartEntity},
    entities::cart_item::{self, Entity as CartItemEntity},
    entities::coupon,
    entities::order::{self},
    entities::order_item::{self},
    errors::ServiceError,
    events::{Event, EventSender},
    services::addresses::AddressService,
    services::catalog::CatalogService,
    services::coupons::{self as coupon_rules, CouponService},
    services::orders::{
        generate_order_number, OrderDetail, OrderStatus, PaymentMethod, PaymentStatus, COD_MAX_NET,
    },
    services::payments::{PaymentIntentResponse, PaymentService},
    services::pricing::{self, PricedLine, Totals},
    services::wallet::WalletService,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// One cart line with live catalog pricing.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub final_unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CartView {
    pub cart_id: Uuid,
    pub coupon_code: Option<String>,
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Quote {
    pub lines: Vec<CartLine>,
    pub coupon_code: Option<String>,
    pub totals: Totals,
}

/// Outcome of a checkout: either a finalized COD/Wallet order or an
/// unconfirmed order awaiting gateway payment.
#[derive(Debug)]
pub enum CheckoutOutcome {
    Finalized(OrderDetail),
    PendingPayment {
        order: order::Model,
        intent: PaymentIntentResponse,
    },
}

/// Remove every line from the user's cart and detach its coupon. Runs in
/// the caller's transaction; used at finalization, never at quote time.
pub(crate) async fn clear_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let cart = CartEntity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?;
    if let Some(cart) = cart {
        CartItemEntity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(conn)
            .await?;
        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(None);
        active.updated_at = Set(Some(Utc::now()));
        active.update(conn).await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct CheckoutService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    catalog: CatalogService,
    coupons: CouponService,
    addresses: AddressService,
    wallet: WalletService,
    payments: PaymentService,
    tax_rate_percent: Decimal,
    shipping_fee: Decimal,
    currency: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        catalog: CatalogService,
        coupons: CouponService,
        addresses: AddressService,
        wallet: WalletService,
        payments: PaymentService,
        tax_rate_percent: Decimal,
        shipping_fee: Decimal,
        currency: String,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
            coupons,
            addresses,
            wallet,
            payments,
            tax_rate_percent,
            shipping_fee,
            currency,
        }
    }

    async fn get_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = CartEntity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db_pool)
            .await?
        {
            return Ok(cart);
        }
        Ok(cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            coupon_code: Set(None),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?)
    }

    async fn cart_items(&self, cart_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    /// Catalog-priced lines for the cart. Fails if any product has gone
    /// missing or inactive since it was added.
    async fn priced_lines(
        &self,
        items: &[cart_item::Model],
    ) -> Result<Vec<(Uuid, PricedLine)>, ServiceError> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = self.catalog.get_product(item.product_id).await?;
            lines.push((
                item.id,
                PricedLine {
                    product_id: product.id,
                    product_name: product.name,
                    quantity: item.quantity,
                    unit_price: product.price,
                    discount_percent: product.discount_percent,
                },
            ));
        }
        Ok(lines)
    }

    fn to_cart_lines(lines: &[(Uuid, PricedLine)]) -> Vec<CartLine> {
        lines
            .iter()
            .map(|(item_id, line)| CartLine {
                item_id: *item_id,
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount_percent: line.discount_percent,
                final_unit_price: line.final_unit_price(),
                line_total: line.line_total(),
            })
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn view_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let items = self.cart_items(cart.id).await?;
        let lines = self.priced_lines(&items).await?;
        let cart_lines = Self::to_cart_lines(&lines);
        let subtotal = cart_lines.iter().map(|l| l.line_total).sum();
        Ok(CartView {
            cart_id: cart.id,
            coupon_code: cart.coupon_code,
            lines: cart_lines,
            subtotal,
        })
    }

    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".into(),
            ));
        }
        let cart = self.get_or_create_cart(user_id).await?;

        let existing = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db_pool)
            .await?;
        let new_quantity = existing.as_ref().map(|i| i.quantity).unwrap_or(0) + quantity;
        let product = self.catalog.ensure_available(product_id, new_quantity).await?;

        match existing {
            Some(item) => {
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(new_quantity);
                active.unit_price = Set(product.price);
                active.discount_percent = Set(product.discount_percent);
                active.updated_at = Set(Some(Utc::now()));
                active.update(&*self.db_pool).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    unit_price: Set(product.price),
                    discount_percent: Set(product.discount_percent),
                    ..Default::default()
                }
                .insert(&*self.db_pool)
                .await?;
            }
        }
        self.view_cart(user_id).await
    }

    async fn owned_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<(cart::Model, cart_item::Model), ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let item = CartItemEntity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;
        Ok((cart, item))
    }

    #[instrument(skip(self))]
    pub async fn increment_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let (_, item) = self.owned_item(user_id, item_id).await?;
        self.catalog
            .ensure_available(item.product_id, item.quantity + 1)
            .await?;
        let quantity = item.quantity + 1;
        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db_pool).await?;
        self.view_cart(user_id).await
    }

    /// Decrementing the last unit removes the line entirely.
    #[instrument(skip(self))]
    pub async fn decrement_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let (_, item) = self.owned_item(user_id, item_id).await?;
        if item.quantity <= 1 {
            item.delete(&*self.db_pool).await?;
        } else {
            let quantity = item.quantity - 1;
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Some(Utc::now()));
            active.update(&*self.db_pool).await?;
        }
        self.view_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let (_, item) = self.owned_item(user_id, item_id).await?;
        item.delete(&*self.db_pool).await?;
        self.view_cart(user_id).await
    }

    /// Validate a coupon against the current cart subtotal and attach it.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: Uuid, code: &str) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let items = self.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "cannot apply a coupon to an empty cart".into(),
            ));
        }
        let lines = self.priced_lines(&items).await?;
        let subtotal: Decimal = lines.iter().map(|(_, l)| l.line_total()).sum();

        let coupon = self.coupons.find_by_code(code).await?;
        coupon_rules::check_applicable(&coupon, subtotal, Utc::now())?;

        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(Some(coupon.code));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db_pool).await?;
        self.view_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(None);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db_pool).await?;
        self.view_cart(user_id).await
    }

    async fn load_cart_coupon(
        &self,
        cart: &cart::Model,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        match &cart.coupon_code {
            Some(code) => Ok(Some(self.coupons.find_by_code(code).await?)),
            None => Ok(None),
        }
    }

    /// Price the current cart for an address without side effects.
    #[instrument(skip(self))]
    pub async fn quote(&self, user_id: Uuid, address_id: Uuid) -> Result<Quote, ServiceError> {
        self.addresses.get_for_user(address_id, user_id).await?;
        let cart = self.get_or_create_cart(user_id).await?;
        let items = self.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".into()));
        }
        let lines = self.priced_lines(&items).await?;
        let priced: Vec<PricedLine> = lines.iter().map(|(_, l)| l.clone()).collect();
        let coupon = self.load_cart_coupon(&cart).await?;
        let totals = pricing::compute_totals(
            &priced,
            self.tax_rate_percent,
            self.shipping_fee,
            coupon.as_ref(),
            Utc::now(),
        )?;
        Ok(Quote {
            lines: Self::to_cart_lines(&lines),
            coupon_code: cart.coupon_code,
            totals,
        })
    }

    /// Check out the cart.
    ///
    /// COD and Wallet orders are finalized immediately (the wallet debit,
    /// coupon redemption, stock decrement and cart clear all commit in one
    /// transaction). Online orders are created unconfirmed with a gateway
    /// intent; the cart survives until verification succeeds.
    #[instrument(skip(self))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        payment_method: PaymentMethod,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let address = self.addresses.get_for_user(address_id, user_id).await?;
        let cart = self.get_or_create_cart(user_id).await?;
        let items = self.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "cannot check out an empty cart".into(),
            ));
        }

        let lines = self.priced_lines(&items).await?;
        for (_, line) in &lines {
            self.catalog
                .ensure_available(line.product_id, line.quantity)
                .await?;
        }
        let priced: Vec<PricedLine> = lines.iter().map(|(_, l)| l.clone()).collect();
        let coupon = self.load_cart_coupon(&cart).await?;
        let totals = pricing::compute_totals(
            &priced,
            self.tax_rate_percent,
            self.shipping_fee,
            coupon.as_ref(),
            Utc::now(),
        )?;

        if payment_method == PaymentMethod::Cod && totals.net > COD_MAX_NET {
            return Err(ServiceError::PaymentMethodNotAllowed(format!(
                "cash on delivery is limited to orders of {} or less",
                COD_MAX_NET
            )));
        }

        match payment_method {
            PaymentMethod::Cod | PaymentMethod::Wallet => {
                self.finalize_direct(
                    user_id,
                    address.id,
                    payment_method,
                    &priced,
                    coupon.as_ref(),
                    &totals,
                )
                .await
            }
            PaymentMethod::Online => {
                self.start_online(user_id, address.id, &priced, coupon.as_ref(), &totals)
                    .await
            }
        }
    }

    async fn finalize_direct(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        payment_method: PaymentMethod,
        lines: &[PricedLine],
        coupon: Option<&coupon::Model>,
        totals: &Totals,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let payment_status = match payment_method {
            PaymentMethod::Wallet => PaymentStatus::Paid,
            _ => PaymentStatus::Pending,
        };
        let order = self
            .insert_order(
                &txn,
                user_id,
                address_id,
                payment_method,
                payment_status,
                true,
                lines,
                coupon,
                totals,
            )
            .await?;

        for line in lines {
            self.catalog
                .decrement_stock(&txn, line.product_id, line.quantity)
                .await?;
        }

        if payment_method == PaymentMethod::Wallet {
            self.wallet
                .debit(
                    &txn,
                    user_id,
                    totals.net,
                    &format!("Payment for order {}", order.order_number),
                    &format!("order:{}:charge", order.id),
                )
                .await?;
        }

        if let Some(coupon) = coupon {
            self.coupons.redeem(&txn, &coupon.code, Utc::now()).await?;
        }

        clear_cart(&txn, user_id).await?;
        txn.commit().await?;

        info!(order_id = %order.id, method = payment_method.as_str(), "order finalized at checkout");
        self.event_sender.send_or_log(Event::OrderCreated(order.id)).await;
        self.event_sender
            .send_or_log(Event::OrderConfirmed(order.id))
            .await;
        if payment_method == PaymentMethod::Wallet {
            self.event_sender
                .send_or_log(Event::WalletDebited {
                    user_id,
                    amount: totals.net,
                })
                .await;
        }
        if let Some(coupon) = coupon {
            self.event_sender
                .send_or_log(Event::CouponRedeemed {
                    code: coupon.code.clone(),
                    order_id: order.id,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::CartCleared { user_id })
            .await;

        let items = crate::entities::order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db_pool)
            .await?;
        Ok(CheckoutOutcome::Finalized(OrderDetail { order, items }))
    }

    async fn start_online(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        lines: &[PricedLine],
        coupon: Option<&coupon::Model>,
        totals: &Totals,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let order = self
            .insert_order(
                &txn,
                user_id,
                address_id,
                PaymentMethod::Online,
                PaymentStatus::Pending,
                false,
                lines,
                coupon,
                totals,
            )
            .await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCreated(order.id)).await;

        // The cart and coupon are untouched until verification succeeds, so
        // a failed or abandoned payment costs the customer nothing.
        let intent = self.payments.create_intent(&order).await?;
        Ok(CheckoutOutcome::PendingPayment { order, intent })
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        address_id: Uuid,
        payment_method: PaymentMethod,
        payment_status: PaymentStatus,
        confirmed: bool,
        lines: &[PricedLine],
        coupon: Option<&coupon::Model>,
        totals: &Totals,
    ) -> Result<order::Model, ServiceError> {
        let order_id = Uuid::new_v4();
        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            user_id: Set(user_id),
            address_id: Set(address_id),
            subtotal: Set(totals.subtotal),
            discount: Set(totals.discount),
            taxes: Set(totals.taxes),
            shipping_charge: Set(totals.shipping),
            net_amount: Set(totals.net),
            tax_rate_percent: Set(self.tax_rate_percent),
            coupon_code: Set(coupon.map(|c| c.code.clone())),
            currency: Set(self.currency.clone()),
            payment_method: Set(payment_method.as_str().to_string()),
            payment_status: Set(payment_status.as_str().to_string()),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            confirmed: Set(confirmed),
            version: Set(1),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        for line in lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.final_unit_price()),
                line_total: Set(line.line_total()),
                status: Set(crate::services::orders::ItemStatus::Pending.as_str().to_string()),
                cancel_reason: Set(None),
                return_reason: Set(None),
                return_verified: Set(false),
                return_decision: Set(None),
                refund_processed: Set(false),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }

        Ok(order)
    }
}
