//! Wallet balances and the idempotent credit/debit ledger.
//!
//! Every balance change writes a `wallet_transactions` row keyed by an
//! idempotency key; replaying the same key is a no-op. Debits are guarded
//! by a conditional update so the balance can never go negative.

use crate::{
    db::DbPool,
    entities::wallet::{self, Entity as WalletEntity},
    entities::wallet_transaction::{self, Entity as WalletTransactionEntity},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

pub const KIND_CREDIT: &str = "credit";
pub const KIND_DEBIT: &str = "debit";

#[derive(Clone)]
pub struct WalletService {
    db_pool: Arc<DbPool>,
}

impl WalletService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Current balance; users without a wallet row have a zero balance.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(WalletEntity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// Ledger entries, newest first.
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<wallet_transaction::Model>, ServiceError> {
        Ok(WalletTransactionEntity::find()
            .filter(wallet_transaction::Column::UserId.eq(user_id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    /// Credit a wallet inside the caller's transaction. Creates the wallet
    /// row on first use. Replaying the same idempotency key does nothing.
    pub async fn credit<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        amount: Decimal,
        reason: &str,
        idempotency_key: &str,
    ) -> Result<(), ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "credit amount must be positive".into(),
            ));
        }
        if self.is_replay(conn, idempotency_key).await? {
            debug!(%user_id, idempotency_key, "wallet credit replay ignored");
            return Ok(());
        }

        let wallet = WalletEntity::find_by_id(user_id).one(conn).await?;
        let balance_after = match wallet {
            Some(w) => {
                let new_balance = w.balance + amount;
                let mut active: wallet::ActiveModel = w.into();
                active.balance = Set(new_balance);
                active.updated_at = Set(Some(Utc::now()));
                active.update(conn).await?;
                new_balance
            }
            None => {
                wallet::ActiveModel {
                    user_id: Set(user_id),
                    balance: Set(amount),
                    ..Default::default()
                }
                .insert(conn)
                .await?;
                amount
            }
        };

        self.record_transaction(
            conn,
            user_id,
            KIND_CREDIT,
            amount,
            reason,
            idempotency_key,
            balance_after,
        )
        .await
    }

    /// Debit a wallet inside the caller's transaction. The conditional
    /// update rejects the debit when the balance is insufficient.
    pub async fn debit<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        amount: Decimal,
        reason: &str,
        idempotency_key: &str,
    ) -> Result<(), ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "debit amount must be positive".into(),
            ));
        }
        if self.is_replay(conn, idempotency_key).await? {
            debug!(%user_id, idempotency_key, "wallet debit replay ignored");
            return Ok(());
        }

        let result = WalletEntity::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).sub(amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(wallet::Column::UserId.eq(user_id))
            .filter(wallet::Column::Balance.gte(amount))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::PaymentMethodNotAllowed(
                "insufficient wallet balance".into(),
            ));
        }

        let balance_after = WalletEntity::find_by_id(user_id)
            .one(conn)
            .await?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO);

        self.record_transaction(
            conn,
            user_id,
            KIND_DEBIT,
            amount,
            reason,
            idempotency_key,
            balance_after,
        )
        .await
    }

    async fn is_replay<C: ConnectionTrait>(
        &self,
        conn: &C,
        idempotency_key: &str,
    ) -> Result<bool, ServiceError> {
        Ok(WalletTransactionEntity::find()
            .filter(wallet_transaction::Column::IdempotencyKey.eq(idempotency_key))
            .one(conn)
            .await?
            .is_some())
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_transaction<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        kind: &str,
        amount: Decimal,
        reason: &str,
        idempotency_key: &str,
        balance_after: Decimal,
    ) -> Result<(), ServiceError> {
        let insert = wallet_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            kind: Set(kind.to_string()),
            amount: Set(amount),
            reason: Set(reason.to_string()),
            idempotency_key: Set(idempotency_key.to_string()),
            balance_after: Set(balance_after),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await;

        match insert {
            Ok(_) => Ok(()),
            // Lost a race on the idempotency key; the first writer wins.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                debug!(%user_id, idempotency_key, "concurrent wallet write, treating as replay");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
