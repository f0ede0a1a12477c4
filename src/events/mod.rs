//! Domain events.
//!
//! Services emit events over an in-process channel after their transaction
//! commits. A background consumer logs them; on Postgres a transactional
//! outbox provides durable delivery for the same event types.

pub mod outbox;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events emitted by the checkout, order, payment and wallet services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderConfirmed(Uuid),
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },
    OrderItemCancelled {
        order_id: Uuid,
        item_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        status: String,
    },
    ReturnRequested {
        order_id: Uuid,
        item_id: Uuid,
    },
    ReturnResolved {
        order_id: Uuid,
        item_id: Uuid,
        approved: bool,
    },
    PaymentVerified {
        order_id: Uuid,
        gateway_payment_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
    },
    CouponRedeemed {
        code: String,
        order_id: Uuid,
    },
    WalletCredited {
        user_id: Uuid,
        amount: Decimal,
    },
    WalletDebited {
        user_id: Uuid,
        amount: Decimal,
    },
    CartCleared {
        user_id: Uuid,
    },
    InvoiceGenerated {
        order_id: Uuid,
        invoice_number: String,
    },
    /// Escape hatch for events replayed from the outbox that no longer map
    /// to a concrete variant.
    Generic {
        event_type: String,
        occurred_at: DateTime<Utc>,
    },
}

impl Event {
    pub fn generic(event_type: impl Into<String>) -> Self {
        Event::Generic {
            event_type: event_type.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Stable name used for outbox rows and log lines.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::OrderCreated(_) => "OrderCreated",
            Event::OrderConfirmed(_) => "OrderConfirmed",
            Event::OrderCancelled { .. } => "OrderCancelled",
            Event::OrderItemCancelled { .. } => "OrderItemCancelled",
            Event::OrderStatusChanged { .. } => "OrderStatusChanged",
            Event::ReturnRequested { .. } => "ReturnRequested",
            Event::ReturnResolved { .. } => "ReturnResolved",
            Event::PaymentVerified { .. } => "PaymentVerified",
            Event::PaymentFailed { .. } => "PaymentFailed",
            Event::CouponRedeemed { .. } => "CouponRedeemed",
            Event::WalletCredited { .. } => "WalletCredited",
            Event::WalletDebited { .. } => "WalletDebited",
            Event::CartCleared { .. } => "CartCleared",
            Event::InvoiceGenerated { .. } => "InvoiceGenerated",
            Event::Generic { .. } => "Generic",
        }
    }
}

/// Cloneable handle for emitting events from services.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget emission. Event loss is tolerable here since the
    /// authoritative state already lives in the database.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.type_name();
        if let Err(e) = self.send(event).await {
            warn!("Failed to emit {} event: {}", name, e);
        }
    }
}

/// Consumer loop for the in-process event channel. Runs until every sender
/// handle is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "Order created");
            }
            Event::OrderConfirmed(order_id) => {
                info!(%order_id, "Order confirmed");
            }
            Event::OrderCancelled { order_id, reason } => {
                info!(%order_id, reason = %reason, "Order cancelled");
            }
            Event::OrderItemCancelled { order_id, item_id } => {
                info!(%order_id, %item_id, "Order item cancelled");
            }
            Event::OrderStatusChanged { order_id, status } => {
                info!(%order_id, status = %status, "Order status changed");
            }
            Event::ReturnRequested { order_id, item_id } => {
                info!(%order_id, %item_id, "Return requested");
            }
            Event::ReturnResolved {
                order_id,
                item_id,
                approved,
            } => {
                info!(%order_id, %item_id, approved, "Return resolved");
            }
            Event::PaymentVerified {
                order_id,
                gateway_payment_id,
            } => {
                info!(%order_id, gateway_payment_id = %gateway_payment_id, "Payment verified");
            }
            Event::PaymentFailed { order_id } => {
                warn!(%order_id, "Payment failed");
            }
            Event::CouponRedeemed { code, order_id } => {
                info!(code = %code, %order_id, "Coupon redeemed");
            }
            Event::WalletCredited { user_id, amount } => {
                info!(%user_id, %amount, "Wallet credited");
            }
            Event::WalletDebited { user_id, amount } => {
                info!(%user_id, %amount, "Wallet debited");
            }
            Event::CartCleared { user_id } => {
                info!(%user_id, "Cart cleared");
            }
            Event::InvoiceGenerated {
                order_id,
                invoice_number,
            } => {
                info!(%order_id, invoice_number = %invoice_number, "Invoice generated");
            }
            Event::Generic {
                event_type,
                occurred_at,
            } => {
                info!(event_type = %event_type, %occurred_at, "Generic event");
            }
        }
    }
    error!("Event processor channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();
        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::generic("Test")).await.is_err());
    }

    #[test]
    fn type_name_matches_variant() {
        assert_eq!(Event::OrderCreated(Uuid::new_v4()).type_name(), "OrderCreated");
        assert_eq!(
            Event::CartCleared {
                user_id: Uuid::new_v4()
            }
            .type_name(),
            "CartCleared"
        );
    }
}
