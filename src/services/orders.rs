//! Order state machine: fulfillment, cancellation, returns and refunds.
//!
//! Every mutation runs under the per-order async lock plus a database
//! transaction, so concurrent requests on the same order serialize and a
//! failed guard rolls back without partial writes.

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::CatalogService,
    services::pricing,
    services::wallet::WalletService,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument};
use uuid::Uuid;

/// Cash-on-delivery is refused for orders whose net amount exceeds this.
pub const COD_MAX_NET: Decimal = dec!(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "out_for_delivery" => Some(OrderStatus::OutForDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// The single permitted forward step, if any. Fulfillment never skips.
    pub fn next_forward(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::OutForDelivery),
            OrderStatus::OutForDelivery => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Shipped,
    Delivered,
    Returned,
    Cancelled,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Shipped => "shipped",
            ItemStatus::Delivered => "delivered",
            ItemStatus::Returned => "returned",
            ItemStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "shipped" => Some(ItemStatus::Shipped),
            "delivered" => Some(ItemStatus::Delivered),
            "returned" => Some(ItemStatus::Returned),
            "cancelled" => Some(ItemStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    Wallet,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Online => "online",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cod" => Some(PaymentMethod::Cod),
            "wallet" => Some(PaymentMethod::Wallet),
            "online" => Some(PaymentMethod::Online),
            _ => None,
        }
    }
}

/// Per-order async lock map shared by the order and payment services.
///
/// Entries are created on first touch and evicted when the last guard for
/// an order drops, so the map only holds orders with in-flight mutations.
#[derive(Clone, Default)]
pub struct OrderLocks {
    inner: Arc<StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one order. The guard is owned so it can be held
    /// across await points; dropping it releases and, when nobody else is
    /// waiting, evicts the entry.
    pub async fn lock(&self, order_id: Uuid) -> OrderLockGuard {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(order_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = entry.lock_owned().await;
        OrderLockGuard {
            locks: self.clone(),
            order_id,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct OrderLockGuard {
    locks: OrderLocks,
    order_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OrderLockGuard {
    fn drop(&mut self) {
        // Release before inspecting the count, otherwise our own guard's
        // handle keeps the entry alive.
        drop(self.guard.take());
        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = map.get(&self.order_id) {
            // The map holds the only remaining handle; waiters hold clones.
            if Arc::strong_count(entry) == 1 {
                map.remove(&self.order_id);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    catalog: CatalogService,
    wallet: WalletService,
    locks: OrderLocks,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        catalog: CatalogService,
        wallet: WalletService,
        locks: OrderLocks,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
            wallet,
            locks,
        }
    }

    pub fn locks(&self) -> OrderLocks {
        self.locks.clone()
    }

    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<OrderDetail, ServiceError> {
        let mut query = OrderEntity::find_by_id(order_id);
        if let Some(user_id) = user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        let order = query
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(OrderDetail { order, items })
    }

    /// Resolve an order number (e.g. `ORD-1A2B3C4D`) to its id, scoped to
    /// the owning user.
    pub async fn find_id_by_order_number(
        &self,
        order_number: &str,
        user_id: Uuid,
    ) -> Result<Uuid, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db_pool)
            .await?
            .map(|o| o.id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", order_number))
            })
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Cancel a whole order. Permitted only while every item that is not
    /// already cancelled is still pending; refunds captured payment for the
    /// cancelled items to the wallet.
    #[instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        reason: String,
    ) -> Result<OrderDetail, ServiceError> {
        let _guard = self.locks.lock(order_id).await;
        let txn = self.db_pool.begin().await?;

        let order = load_order(&txn, order_id, Some(user_id)).await?;
        let status = parse_order_status(&order.status)?;
        if matches!(status, OrderStatus::Cancelled | OrderStatus::Delivered) {
            return Err(ServiceError::InvalidStateTransition(format!(
                "order is already {}",
                order.status
            )));
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        let blocking = items.iter().any(|i| {
            i.status != ItemStatus::Cancelled.as_str() && i.status != ItemStatus::Pending.as_str()
        });
        if blocking {
            return Err(ServiceError::InvalidStateTransition(
                "order has items that already shipped".into(),
            ));
        }

        let captured = order.payment_status == PaymentStatus::Paid.as_str();
        let mut refunded_total = Decimal::ZERO;
        for item in items
            .iter()
            .filter(|i| i.status == ItemStatus::Pending.as_str())
        {
            if captured && !item.refund_processed {
                self.wallet
                    .credit(
                        &txn,
                        user_id,
                        item.line_total,
                        &format!("Refund for cancelled order {}", order.order_number),
                        &format!("order:{}:item:{}:refund", order_id, item.id),
                    )
                    .await?;
                refunded_total += item.line_total;
            }
            self.catalog
                .restock(&txn, item.product_id, item.quantity)
                .await?;

            let mut active: order_item::ActiveModel = item.clone().into();
            active.status = Set(ItemStatus::Cancelled.as_str().to_string());
            active.cancel_reason = Set(Some(reason.clone()));
            if captured {
                active.refund_processed = Set(true);
            }
            active.updated_at = Set(Some(Utc::now()));
            active.update(&txn).await?;
        }

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(OrderStatus::Cancelled.as_str().to_string());
        if captured {
            active.payment_status = Set(PaymentStatus::Refunded.as_str().to_string());
        }
        active.version = Set(order.version + 1);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(%order_id, %refunded_total, "order cancelled");
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                reason,
            })
            .await;
        if refunded_total > Decimal::ZERO {
            self.event_sender
                .send_or_log(Event::WalletCredited {
                    user_id,
                    amount: refunded_total,
                })
                .await;
        }

        self.get_order(order_id, Some(user_id)).await
    }

    /// Cancel one pending item and recompute the order aggregates. The
    /// coupon discount is clamped to the remaining subtotal; shipping is
    /// unchanged.
    #[instrument(skip(self, reason))]
    pub async fn cancel_item(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        user_id: Uuid,
        reason: String,
    ) -> Result<OrderDetail, ServiceError> {
        let _guard = self.locks.lock(order_id).await;
        let txn = self.db_pool.begin().await?;

        let order = load_order(&txn, order_id, Some(user_id)).await?;
        let item = load_item(&txn, order_id, item_id).await?;
        if item.status != ItemStatus::Pending.as_str() {
            return Err(ServiceError::InvalidStateTransition(format!(
                "item is {}, only pending items can be cancelled",
                item.status
            )));
        }

        let captured = order.payment_status == PaymentStatus::Paid.as_str();
        if captured && !item.refund_processed {
            self.wallet
                .credit(
                    &txn,
                    user_id,
                    item.line_total,
                    &format!("Refund for cancelled item on order {}", order.order_number),
                    &format!("order:{}:item:{}:refund", order_id, item.id),
                )
                .await?;
        }
        self.catalog
            .restock(&txn, item.product_id, item.quantity)
            .await?;

        let mut active: order_item::ActiveModel = item.clone().into();
        active.status = Set(ItemStatus::Cancelled.as_str().to_string());
        active.cancel_reason = Set(Some(reason.clone()));
        if captured {
            active.refund_processed = Set(true);
        }
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        // Recompute aggregates over the items that remain.
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        let remaining_subtotal: Decimal = items
            .iter()
            .filter(|i| i.status != ItemStatus::Cancelled.as_str())
            .map(|i| i.line_total)
            .sum();
        let all_cancelled = items
            .iter()
            .all(|i| i.status == ItemStatus::Cancelled.as_str());
        let totals = pricing::recompute_after_cancel(
            remaining_subtotal,
            order.discount,
            order.tax_rate_percent,
            order.shipping_charge,
        );

        let mut active: order::ActiveModel = order.clone().into();
        active.subtotal = Set(totals.subtotal);
        active.discount = Set(totals.discount);
        active.taxes = Set(totals.taxes);
        active.net_amount = Set(totals.net);
        if all_cancelled {
            active.status = Set(OrderStatus::Cancelled.as_str().to_string());
            if captured {
                active.payment_status = Set(PaymentStatus::Refunded.as_str().to_string());
            }
        }
        active.version = Set(order.version + 1);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderItemCancelled { order_id, item_id })
            .await;
        self.get_order(order_id, Some(user_id)).await
    }

    /// Request a return for a delivered item. The reason must carry actual
    /// text; empty and whitespace-only reasons fail validation.
    #[instrument(skip(self, reason))]
    pub async fn request_return(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        user_id: Uuid,
        reason: String,
    ) -> Result<OrderDetail, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "return reason must not be empty".into(),
            ));
        }

        let _guard = self.locks.lock(order_id).await;
        let txn = self.db_pool.begin().await?;

        load_order(&txn, order_id, Some(user_id)).await?;
        let item = load_item(&txn, order_id, item_id).await?;
        if item.status != ItemStatus::Delivered.as_str() {
            return Err(ServiceError::InvalidStateTransition(format!(
                "item is {}, only delivered items can be returned",
                item.status
            )));
        }

        let mut active: order_item::ActiveModel = item.into();
        active.status = Set(ItemStatus::Returned.as_str().to_string());
        active.return_reason = Set(Some(reason));
        active.return_verified = Set(false);
        active.return_decision = Set(None);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReturnRequested { order_id, item_id })
            .await;
        self.get_order(order_id, Some(user_id)).await
    }

    /// Admin decision on a pending return. Approval credits the item's line
    /// total to the customer's wallet, exactly once.
    #[instrument(skip(self))]
    pub async fn verify_return(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        approve: bool,
    ) -> Result<OrderDetail, ServiceError> {
        let _guard = self.locks.lock(order_id).await;
        let txn = self.db_pool.begin().await?;

        let order = load_order(&txn, order_id, None).await?;
        let item = load_item(&txn, order_id, item_id).await?;
        if item.status != ItemStatus::Returned.as_str() {
            return Err(ServiceError::InvalidStateTransition(
                "item has no return to verify".into(),
            ));
        }
        if item.return_verified {
            return Err(ServiceError::InvalidStateTransition(
                "return is already verified".into(),
            ));
        }

        if approve && !item.refund_processed {
            self.wallet
                .credit(
                    &txn,
                    order.user_id,
                    item.line_total,
                    &format!("Refund for returned item on order {}", order.order_number),
                    &format!("order:{}:item:{}:refund", order_id, item.id),
                )
                .await?;
            self.catalog
                .restock(&txn, item.product_id, item.quantity)
                .await?;
        }

        let mut active: order_item::ActiveModel = item.into();
        active.return_verified = Set(true);
        active.return_decision = Set(Some(
            if approve { "approved" } else { "rejected" }.to_string(),
        ));
        if approve {
            active.refund_processed = Set(true);
        }
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReturnResolved {
                order_id,
                item_id,
                approved: approve,
            })
            .await;
        self.get_order(order_id, None).await
    }

    /// Admin fulfillment advance. Exactly one forward step at a time;
    /// shipping cascades to pending items, delivery to shipped items.
    ///
    /// Fulfillment is whole-order: items never advance individually, so a
    /// mix of delivered and pending items cannot occur. Per-item divergence
    /// only enters through cancellation and returns.
    #[instrument(skip(self))]
    pub async fn advance_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<OrderDetail, ServiceError> {
        let _guard = self.locks.lock(order_id).await;
        let txn = self.db_pool.begin().await?;

        let order = load_order(&txn, order_id, None).await?;
        if !order.confirmed {
            return Err(ServiceError::InvalidStateTransition(
                "order is awaiting payment confirmation".into(),
            ));
        }
        let current = parse_order_status(&order.status)?;
        if current.next_forward() != Some(target) {
            return Err(ServiceError::InvalidStateTransition(format!(
                "cannot move order from {} to {}",
                current.as_str(),
                target.as_str()
            )));
        }

        match target {
            OrderStatus::Shipped => {
                cascade_items(&txn, order_id, ItemStatus::Pending, ItemStatus::Shipped).await?;
            }
            OrderStatus::Delivered => {
                cascade_items(&txn, order_id, ItemStatus::Shipped, ItemStatus::Delivered).await?;
            }
            _ => {}
        }

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(target.as_str().to_string());
        // COD is collected on the doorstep.
        if target == OrderStatus::Delivered
            && order.payment_method == PaymentMethod::Cod.as_str()
            && order.payment_status == PaymentStatus::Pending.as_str()
        {
            active.payment_status = Set(PaymentStatus::Paid.as_str().to_string());
        }
        active.version = Set(order.version + 1);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                status: target.as_str().to_string(),
            })
            .await;
        self.get_order(order_id, None).await
    }
}

pub(crate) async fn load_order(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<order::Model, ServiceError> {
    let mut query = OrderEntity::find_by_id(order_id);
    if let Some(user_id) = user_id {
        query = query.filter(order::Column::UserId.eq(user_id));
    }
    query
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

async fn load_item(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    item_id: Uuid,
) -> Result<order_item::Model, ServiceError> {
    OrderItemEntity::find_by_id(item_id)
        .filter(order_item::Column::OrderId.eq(order_id))
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order item {} not found", item_id)))
}

async fn cascade_items(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    from: ItemStatus,
    to: ItemStatus,
) -> Result<(), ServiceError> {
    OrderItemEntity::update_many()
        .col_expr(
            order_item::Column::Status,
            sea_orm::sea_query::Expr::value(to.as_str()),
        )
        .col_expr(
            order_item::Column::UpdatedAt,
            sea_orm::sea_query::Expr::value(Some(Utc::now())),
        )
        .filter(order_item::Column::OrderId.eq(order_id))
        .filter(order_item::Column::Status.eq(from.as_str()))
        .exec(txn)
        .await?;
    Ok(())
}

fn parse_order_status(s: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::parse(s)
        .ok_or_else(|| ServiceError::InternalError(format!("unknown order status {}", s)))
}

/// Order numbers are short, human-quotable handles.
pub fn generate_order_number() -> String {
    format!(
        "ORD-{}",
        Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn order_status_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
    }

    #[rstest]
    #[case(OrderStatus::Pending, Some(OrderStatus::Processing))]
    #[case(OrderStatus::Processing, Some(OrderStatus::Shipped))]
    #[case(OrderStatus::Shipped, Some(OrderStatus::OutForDelivery))]
    #[case(OrderStatus::OutForDelivery, Some(OrderStatus::Delivered))]
    #[case(OrderStatus::Delivered, None)]
    #[case(OrderStatus::Cancelled, None)]
    fn fulfillment_moves_strictly_forward(
        #[case] from: OrderStatus,
        #[case] expected: Option<OrderStatus>,
    ) {
        assert_eq!(from.next_forward(), expected);
    }

    #[rstest]
    #[case("COD", Some(PaymentMethod::Cod))]
    #[case("Wallet", Some(PaymentMethod::Wallet))]
    #[case("online", Some(PaymentMethod::Online))]
    #[case("crypto", None)]
    fn payment_method_parsing_is_case_insensitive(
        #[case] input: &str,
        #[case] expected: Option<PaymentMethod>,
    ) {
        assert_eq!(PaymentMethod::parse(input), expected);
    }

    #[test]
    fn order_number_shape() {
        let n = generate_order_number();
        assert!(n.starts_with("ORD-"));
        assert_eq!(n.len(), 12);
    }

    #[tokio::test]
    async fn lock_map_evicts_entries_once_released() {
        let locks = OrderLocks::new();
        for _ in 0..64 {
            let guard = locks.lock(Uuid::new_v4()).await;
            assert_eq!(locks.len(), 1);
            drop(guard);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn order_locks_serialize_access() {
        let locks = OrderLocks::new();
        let order_id = Uuid::new_v4();
        let guard = locks.lock(order_id).await;
        let locks2 = locks.clone();
        let contender = tokio::spawn(async move {
            let _g = locks2.lock(order_id).await;
        });
        // The contender cannot finish while the guard is held.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }
}
