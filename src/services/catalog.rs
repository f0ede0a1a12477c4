//! Catalog reads and stock accounting.
//!
//! Product lookups are fronted by a short-TTL in-memory cache; stock
//! decrements go straight to the database as conditional updates so the
//! cache can never oversell.

use crate::{
    cache::InMemoryCache,
    db::DbPool,
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

fn cache_key(product_id: Uuid) -> String {
    format!("product:{}", product_id)
}

#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    cache: InMemoryCache,
    cache_ttl: Duration,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, cache: InMemoryCache, cache_ttl: Duration) -> Self {
        Self {
            db_pool,
            cache,
            cache_ttl,
        }
    }

    /// Fetch an active product, consulting the cache first. Inactive and
    /// unknown products are both reported as not found.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        let key = cache_key(product_id);
        match self.cache.get_json::<product::Model>(&key).await {
            Ok(Some(cached)) if cached.is_active => return Ok(cached),
            Ok(_) => {}
            Err(e) => warn!("catalog cache read failed: {}", e),
        }

        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if let Err(e) = self
            .cache
            .set_json(&key, &product, Some(self.cache_ttl))
            .await
        {
            warn!("catalog cache write failed: {}", e);
        }
        Ok(product)
    }

    /// Check (without reserving) that `quantity` units are available.
    pub async fn ensure_available(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<product::Model, ServiceError> {
        let product = self.get_product(product_id).await?;
        if product.available_quantity < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "only {} of {} available",
                product.available_quantity, product.name
            )));
        }
        Ok(product)
    }

    /// Decrement stock inside the caller's transaction. The guard on
    /// `available_quantity` makes concurrent oversells impossible; zero
    /// affected rows means the stock ran out.
    pub async fn decrement_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = ProductEntity::update_many()
            .col_expr(
                product::Column::AvailableQuantity,
                Expr::col(product::Column::AvailableQuantity).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::AvailableQuantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "insufficient stock for product {}",
                product_id
            )));
        }

        // Stale quantity must not be served from cache after a sale.
        if let Err(e) = self.cache.delete(&cache_key(product_id)).await {
            warn!("catalog cache invalidation failed: {}", e);
        }
        debug!(%product_id, quantity, "stock decremented");
        Ok(())
    }

    /// Return stock after a cancellation or approved return.
    pub async fn restock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        ProductEntity::update_many()
            .col_expr(
                product::Column::AvailableQuantity,
                Expr::col(product::Column::AvailableQuantity).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        if let Err(e) = self.cache.delete(&cache_key(product_id)).await {
            warn!("catalog cache invalidation failed: {}", e);
        }
        Ok(())
    }
}
