//! Shipping address lookups, always scoped to the owning user.

use crate::{
    db::DbPool,
    entities::address::{self, Entity as AddressEntity},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct AddressService {
    db_pool: Arc<DbPool>,
}

impl AddressService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Fetch an address owned by `user_id`. Addresses belonging to other
    /// users are reported as not found rather than forbidden.
    #[instrument(skip(self))]
    pub async fn get_for_user(
        &self,
        address_id: Uuid,
        user_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        AddressEntity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))
    }
}
