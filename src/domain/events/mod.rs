//! Domain events
use serde::Serialize;

use crate::domain::aggregates::{Approval, OrderStatus};
use crate::domain::value_objects::{Money, TransactionNumber};
use crate::{OrderId, ProductId, RefundId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Refund(RefundEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: ProductId, stock: i64 },
    StockAdjusted { product_id: ProductId, delta: i64, stock: i64 },
    Deleted { product_id: ProductId, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, user_id: UserId, transaction_number: TransactionNumber, total: Money },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
    LinesRemoved { order_id: OrderId, removed: usize, total: Money },
    Cancelled { order_id: OrderId, transaction_number: TransactionNumber },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefundEvent {
    Submitted { refund_id: RefundId, transaction_number: TransactionNumber },
    Decided { refund_id: RefundId, transaction_number: TransactionNumber, approval: Approval },
}

impl DomainEvent {
    /// Messaging subject, e.g. `store.order.placed`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Product(e) => ("product", match e {
                ProductEvent::Created { .. } => "created",
                ProductEvent::StockAdjusted { .. } => "stock_adjusted",
                ProductEvent::Deleted { .. } => "deleted",
            }),
            Self::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::StatusChanged { .. } => "status_changed",
                OrderEvent::LinesRemoved { .. } => "lines_removed",
                OrderEvent::Cancelled { .. } => "cancelled",
            }),
            Self::Refund(e) => ("refund", match e {
                RefundEvent::Submitted { .. } => "submitted",
                RefundEvent::Decided { approval: Approval::Approved, .. } => "approved",
                RefundEvent::Decided { .. } => "declined",
            }),
        };
        format!("store.{aggregate}.{name}")
    }
}
