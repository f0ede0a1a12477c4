//! Invoice generation for delivered orders.

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::{ItemStatus, OrderStatus},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct InvoiceLine {
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Document handle for an order invoice. Rendering is out of scope; this
/// carries everything a renderer needs.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Invoice {
    pub invoice_number: String,
    pub issued_at: DateTime<Utc>,
    pub order_id: Uuid,
    pub order_number: String,
    pub currency: String,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub taxes: Decimal,
    pub shipping: Decimal,
    pub net_amount: Decimal,
}

fn generate_invoice_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..100_000_000);
    format!("INV-{:08}", suffix)
}

#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl InvoiceService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Build an invoice for a delivered order. Cancelled and returned items
    /// are excluded from the billed lines.
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Invoice, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status != OrderStatus::Delivered.as_str() {
            return Err(ServiceError::InvalidStateTransition(
                "invoices are only available for delivered orders".into(),
            ));
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db_pool)
            .await?;
        let lines: Vec<InvoiceLine> = items
            .into_iter()
            .filter(|i| {
                i.status != ItemStatus::Cancelled.as_str()
                    && i.status != ItemStatus::Returned.as_str()
            })
            .map(|i| InvoiceLine {
                product_name: i.product_name,
                quantity: i.quantity,
                unit_price: i.unit_price,
                line_total: i.line_total,
            })
            .collect();

        let invoice = Invoice {
            invoice_number: generate_invoice_number(),
            issued_at: Utc::now(),
            order_id,
            order_number: order.order_number.clone(),
            currency: order.currency,
            lines,
            subtotal: order.subtotal,
            discount: order.discount,
            taxes: order.taxes,
            shipping: order.shipping_charge,
            net_amount: order.net_amount,
        };

        info!(%order_id, invoice_number = %invoice.invoice_number, "invoice generated");
        self.event_sender
            .send_or_log(Event::InvoiceGenerated {
                order_id,
                invoice_number: invoice.invoice_number.clone(),
            })
            .await;
        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_number_shape() {
        let n = generate_invoice_number();
        assert!(n.starts_with("INV-"));
        assert_eq!(n.len(), 12);
        assert!(n[4..].chars().all(|c| c.is_ascii_digit()));
    }
}
