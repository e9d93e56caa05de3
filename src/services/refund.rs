//! Refund engine.
//!
//! A refund carries no items of its own. Approval resolves the order by
//! transaction number at decision time and restores stock for the lines the
//! order holds at that moment.
//!
//! Approval claims the refund first (pending -> approved compare-and-set),
//! so two concurrent approvals cannot both restore stock. The order is then
//! moved to `Cancelled` with a second compare-and-set, and only after that
//! does stock move. A lost order race therefore releases the claim without
//! any stock having changed. If a stock increment fails afterwards, the
//! applied increments are reversed, the order returns to its prior status
//! and the refund returns to pending.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::access::Identity;
use super::catalog::CatalogService;
use super::checkout::order_error;
use super::publisher::EventPublisher;
use crate::domain::aggregates::{Approval, Order, OrderLine, OrderStatus, Refund, RefundError};
use crate::domain::events::{DomainEvent, OrderEvent, RefundEvent};
use crate::domain::value_objects::{Quantity, TransactionNumber};
use crate::repository::{CatalogRepository, OrderRepository, RefundRepository, Store};
use crate::{ProductId, RefundId, Result, StoreError};

#[derive(Debug, Clone)]
pub struct SubmitRefund {
    pub transaction_number: TransactionNumber,
    pub reason: String,
    /// Defaults to now.
    pub date_cancelled: Option<DateTime<Utc>>,
}

/// A refund joined with the order it targets. The order fields are absent
/// when the order can no longer be found.
#[derive(Debug, Clone, Serialize)]
pub struct RefundView {
    #[serde(flatten)]
    pub refund: Refund,
    pub items: Option<Vec<OrderLine>>,
    pub payment_method: Option<String>,
    pub order_status: Option<OrderStatus>,
}

#[derive(Clone)]
pub struct RefundService {
    store: Arc<dyn Store>,
    catalog: CatalogService,
    publisher: EventPublisher,
}

impl RefundService {
    pub fn new(store: Arc<dyn Store>, catalog: CatalogService, publisher: EventPublisher) -> Self {
        Self { store, catalog, publisher }
    }

    async fn load(&self, id: RefundId) -> Result<Refund> {
        self.store.get_refund(id).await?.ok_or(StoreError::RefundNotFound(id))
    }

    async fn order_for(&self, txn: &TransactionNumber) -> Result<Order> {
        self.store
            .find_order_by_transaction(txn)
            .await?
            .ok_or_else(|| StoreError::OrderNotFound(txn.to_string()))
    }

    /// Open a pending refund against an order. Neither stock nor the order
    /// is touched.
    pub async fn submit_refund(&self, identity: &Identity, req: SubmitRefund) -> Result<Refund> {
        let order = self.order_for(&req.transaction_number).await?;
        identity.require_owner_or_privileged(order.user_id, "request refund")?;
        let date = req.date_cancelled.unwrap_or_else(Utc::now);
        let refund = Refund::submit(req.transaction_number, req.reason, date, identity.user_id)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        self.store.insert_refund(&refund).await?;
        info!(refund_id = %refund.id, transaction_number = %refund.transaction_number, submitted_by = %identity.user_id, "refund submitted");
        self.publisher
            .publish([DomainEvent::Refund(RefundEvent::Submitted {
                refund_id: refund.id,
                transaction_number: refund.transaction_number.clone(),
            })])
            .await;
        Ok(refund)
    }

    pub async fn approve_refund(&self, identity: &Identity, id: RefundId) -> Result<Refund> {
        identity.require_privileged("approve refund")?;
        let mut refund = self.load(id).await?;
        refund.decide(Approval::Approved).map_err(|_: RefundError| StoreError::AlreadyDecided(id))?;

        let order = self.order_for(&refund.transaction_number).await?;
        let mut cancelled = order.clone();
        cancelled.cancel().map_err(order_error)?;
        for line in &order.lines {
            if self.store.get_product(line.product_id).await?.is_none() {
                return Err(StoreError::ProductNotFound(line.product_id));
            }
        }

        let Some(claimed) = self.store.update_approval(id, Approval::Pending, Approval::Approved).await? else {
            return Err(StoreError::AlreadyDecided(id));
        };

        match self.store.update_order_status(order.id, order.status, cancelled.status).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.release(id).await;
                let status = self.store.get_order(order.id).await?.map_or(order.status, |o| o.status);
                warn!(refund_id = %id, order_id = %order.id, %status, "order changed while approving refund");
                return Err(StoreError::InvalidTransition { from: status, to: OrderStatus::Cancelled });
            }
            Err(e) => {
                self.release(id).await;
                return Err(e);
            }
        }

        let mut restored: Vec<(ProductId, Quantity)> = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            if let Err(e) = self.catalog.adjust_stock(line.product_id, line.quantity.as_increment()).await {
                self.abandon(id, &order, &restored).await;
                return Err(e);
            }
            restored.push((line.product_id, line.quantity));
        }

        info!(
            refund_id = %id,
            order_id = %order.id,
            transaction_number = %order.transaction_number,
            lines = restored.len(),
            "refund approved, order cancelled"
        );
        self.publisher
            .publish([
                DomainEvent::Order(OrderEvent::Cancelled {
                    order_id: order.id,
                    transaction_number: order.transaction_number.clone(),
                }),
                DomainEvent::Refund(RefundEvent::Decided {
                    refund_id: id,
                    transaction_number: claimed.transaction_number.clone(),
                    approval: Approval::Approved,
                }),
            ])
            .await;
        Ok(claimed)
    }

    /// Undo a cancelled approval whose stock restore failed part way.
    async fn abandon(&self, id: RefundId, order: &Order, restored: &[(ProductId, Quantity)]) {
        warn!(refund_id = %id, order_id = %order.id, lines = restored.len(), "refund approval failed, reverting");
        for &(product_id, quantity) in restored.iter().rev() {
            if let Err(e) = self.catalog.adjust_stock(product_id, quantity.as_decrement()).await {
                error!(refund_id = %id, %product_id, quantity = quantity.value(), error = %e, "failed to revert restored stock");
            }
        }
        match self.store.update_order_status(order.id, OrderStatus::Cancelled, order.status).await {
            Ok(Some(_)) => {}
            Ok(None) => error!(order_id = %order.id, "order was not cancelled while reverting"),
            Err(e) => error!(order_id = %order.id, error = %e, "failed to restore order status"),
        }
        self.release(id).await;
    }

    /// Return a claimed refund to pending.
    async fn release(&self, id: RefundId) {
        match self.store.update_approval(id, Approval::Approved, Approval::Pending).await {
            Ok(Some(_)) => {}
            Ok(None) => error!(refund_id = %id, "refund was not in approved state while reverting"),
            Err(e) => error!(refund_id = %id, error = %e, "failed to return refund to pending"),
        }
    }

    pub async fn decline_refund(&self, identity: &Identity, id: RefundId) -> Result<Refund> {
        identity.require_privileged("decline refund")?;
        let Some(refund) = self.store.update_approval(id, Approval::Pending, Approval::Declined).await? else {
            self.load(id).await?;
            return Err(StoreError::AlreadyDecided(id));
        };
        info!(refund_id = %id, transaction_number = %refund.transaction_number, "refund declined");
        self.publisher
            .publish([DomainEvent::Refund(RefundEvent::Decided {
                refund_id: id,
                transaction_number: refund.transaction_number.clone(),
                approval: Approval::Declined,
            })])
            .await;
        Ok(refund)
    }

    /// Every refund for privileged callers, otherwise the caller's own.
    pub async fn view_refunds(&self, identity: &Identity) -> Result<Vec<RefundView>> {
        let filter = if identity.is_privileged() { None } else { Some(identity.user_id) };
        let refunds = self.store.list_refunds(filter).await?;
        let mut views = Vec::with_capacity(refunds.len());
        for refund in refunds {
            let order = self.store.find_order_by_transaction(&refund.transaction_number).await?;
            views.push(match order {
                Some(order) => RefundView {
                    refund,
                    items: Some(order.lines),
                    payment_method: Some(order.payment_method),
                    order_status: Some(order.status),
                },
                None => RefundView { refund, items: None, payment_method: None, order_status: None },
            });
        }
        Ok(views)
    }
}
