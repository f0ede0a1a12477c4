//! Payment reconciliation against the external gateway.
//!
//! Gateway callbacks are authenticated with an HMAC-SHA256 signature over
//! `gateway_order_id|gateway_payment_id` and deduplicated through a marker
//! row whose unique constraint makes finalization at-most-once. Gateway
//! calls run under a timeout and are never retried automatically.

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::payment_callback,
    entities::payment_intent::{self, Entity as PaymentIntentEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::CatalogService,
    services::checkout,
    services::coupons::CouponService,
    services::orders::{load_order, OrderLocks, PaymentStatus},
};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Outbound contract with the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, anyhow::Error>;
}

#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
}

/// Deterministic local gateway used outside production.
#[derive(Debug, Clone, Default)]
pub struct SandboxGateway;

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_order(
        &self,
        _amount: Decimal,
        _currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, anyhow::Error> {
        Ok(GatewayOrder {
            gateway_order_id: format!("gw_{}", receipt),
        })
    }
}

/// Signature over `gateway_order_id|gateway_payment_id`, hex-encoded.
pub fn compute_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take a key of any size");
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaymentIntentResponse {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VerifyPaymentResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_status: PaymentStatus,
}

#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    gateway: Arc<dyn PaymentGateway>,
    gateway_secret: String,
    gateway_timeout: Duration,
    coupons: CouponService,
    catalog: CatalogService,
    locks: OrderLocks,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        gateway_secret: String,
        gateway_timeout: Duration,
        coupons: CouponService,
        catalog: CatalogService,
        locks: OrderLocks,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            gateway,
            gateway_secret,
            gateway_timeout,
            coupons,
            catalog,
            locks,
        }
    }

    /// Create a gateway intent for an order. The gateway call runs under a
    /// timeout; an elapsed timer surfaces as `GatewayTimeout`.
    #[instrument(skip(self, order))]
    pub async fn create_intent(
        &self,
        order: &order::Model,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let receipt = format!("{}_{}", order.order_number, Uuid::new_v4().simple());
        let gateway_order = tokio::time::timeout(
            self.gateway_timeout,
            self.gateway
                .create_order(order.net_amount, &order.currency, &receipt),
        )
        .await
        .map_err(|_| ServiceError::GatewayTimeout)?
        .map_err(|e| {
            warn!("gateway order creation failed: {}", e);
            ServiceError::InternalError(format!("gateway order creation failed: {}", e))
        })?;

        let intent = payment_intent::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            gateway_order_id: Set(gateway_order.gateway_order_id.clone()),
            amount: Set(order.net_amount),
            currency: Set(order.currency.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db_pool)
        .await?;

        info!(order_id = %order.id, gateway_order_id = %intent.gateway_order_id, "payment intent created");
        Ok(PaymentIntentResponse {
            order_id: order.id,
            gateway_order_id: intent.gateway_order_id,
            amount: intent.amount,
            currency: intent.currency,
        })
    }

    /// Verify a gateway callback and finalize the order.
    ///
    /// A replayed `(gateway_order_id, gateway_payment_id)` pair, or a
    /// callback for an already-paid order, fails with
    /// `DuplicatePaymentCallback`; the HTTP handler reports those as
    /// success without re-running any side effect.
    #[instrument(skip(self, request), fields(gateway_order_id = %request.gateway_order_id))]
    pub async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerifyPaymentResponse, ServiceError> {
        let intent = PaymentIntentEntity::find()
            .filter(payment_intent::Column::GatewayOrderId.eq(request.gateway_order_id.clone()))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No payment intent for gateway order {}",
                    request.gateway_order_id
                ))
            })?;
        let order_id = intent.order_id;

        let expected = compute_signature(
            &self.gateway_secret,
            &request.gateway_order_id,
            &request.gateway_payment_id,
        );
        if !constant_time_eq(expected.as_bytes(), request.signature.as_bytes()) {
            self.mark_payment_failed(order_id).await?;
            self.event_sender
                .send_or_log(Event::PaymentFailed { order_id })
                .await;
            return Err(ServiceError::SignatureInvalid);
        }

        let _guard = self.locks.lock(order_id).await;
        let txn = self.db_pool.begin().await?;

        // The marker row is the at-most-once guard; a replay dies here on
        // the unique constraint before touching anything else.
        let marker = payment_callback::ActiveModel {
            id: Set(Uuid::new_v4()),
            gateway_order_id: Set(request.gateway_order_id.clone()),
            gateway_payment_id: Set(request.gateway_payment_id.clone()),
            order_id: Set(order_id),
            received_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await;
        if let Err(e) = marker {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                return Err(ServiceError::DuplicatePaymentCallback);
            }
            return Err(e.into());
        }

        let order = load_order(&txn, order_id, None).await?;
        if order.payment_status == PaymentStatus::Paid.as_str() {
            // Racing intent from a retry; the first finalization stands.
            return Err(ServiceError::DuplicatePaymentCallback);
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        for item in &items {
            self.catalog
                .decrement_stock(&txn, item.product_id, item.quantity)
                .await?;
        }

        if let Some(code) = order.coupon_code.clone() {
            self.coupons.redeem(&txn, &code, Utc::now()).await?;
        }

        checkout::clear_cart(&txn, order.user_id).await?;

        let order_number = order.order_number.clone();
        let user_id = order.user_id;
        let coupon_code = order.coupon_code.clone();
        let mut active: order::ActiveModel = order.into();
        active.confirmed = Set(true);
        active.payment_status = Set(PaymentStatus::Paid.as_str().to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(%order_id, "payment verified, order finalized");
        self.event_sender
            .send_or_log(Event::PaymentVerified {
                order_id,
                gateway_payment_id: request.gateway_payment_id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderConfirmed(order_id))
            .await;
        if let Some(code) = coupon_code {
            self.event_sender
                .send_or_log(Event::CouponRedeemed {
                    code,
                    order_id,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::CartCleared { user_id })
            .await;

        Ok(VerifyPaymentResponse {
            order_id,
            order_number,
            payment_status: PaymentStatus::Paid,
        })
    }

    /// Create a fresh intent for an order whose payment failed or was
    /// abandoned. Never creates a second order; retrying a paid order is an
    /// invalid transition.
    #[instrument(skip(self))]
    pub async fn retry_payment(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let _guard = self.locks.lock(order_id).await;

        let txn = self.db_pool.begin().await?;
        let order = load_order(&txn, order_id, Some(user_id)).await?;
        txn.commit().await?;

        if order.payment_method != super::orders::PaymentMethod::Online.as_str() {
            return Err(ServiceError::InvalidStateTransition(
                "only online orders support payment retry".into(),
            ));
        }
        if order.payment_status == PaymentStatus::Paid.as_str() {
            return Err(ServiceError::InvalidStateTransition(
                "order is already paid".into(),
            ));
        }
        if order.status == super::orders::OrderStatus::Cancelled.as_str() {
            return Err(ServiceError::InvalidStateTransition(
                "order is cancelled".into(),
            ));
        }

        self.create_intent(&order).await
    }

    /// Record a failed verification attempt. The guard on `payment_status`
    /// keeps a stale invalid callback from demoting an order a concurrent
    /// verification already finalized.
    async fn mark_payment_failed(&self, order_id: Uuid) -> Result<(), ServiceError> {
        OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed.as_str()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::Paid.as_str()))
            .exec(&*self.db_pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_and_hex() {
        let sig = compute_signature("secret", "gw_1", "pay_1");
        assert_eq!(sig, compute_signature("secret", "gw_1", "pay_1"));
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_all_inputs() {
        let base = compute_signature("secret", "gw_1", "pay_1");
        assert_ne!(base, compute_signature("other", "gw_1", "pay_1"));
        assert_ne!(base, compute_signature("secret", "gw_2", "pay_1"));
        assert_ne!(base, compute_signature("secret", "gw_1", "pay_2"));
    }

    #[test]
    fn constant_time_eq_semantics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[tokio::test]
    async fn sandbox_gateway_is_deterministic_per_receipt() {
        let gateway = SandboxGateway;
        let order = gateway
            .create_order(rust_decimal_macros::dec!(100), "INR", "ORD-1")
            .await
            .unwrap();
        assert_eq!(order.gateway_order_id, "gw_ORD-1");
    }
}
