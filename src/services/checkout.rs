//! Checkout and order engine.
//!
//! Placing an order decrements stock line by line through
//! [`CatalogService::adjust_stock`]. There is no transaction spanning the
//! lines: if any step fails, every decrement already applied by the same
//! call is reversed before the error is returned.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::access::Identity;
use super::cart::CartService;
use super::catalog::CatalogService;
use super::publisher::EventPublisher;
use crate::domain::aggregates::{Order, OrderError, OrderLine, OrderStatus};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, Quantity, TransactionNumber};
use crate::repository::{CartRepository, OrderRepository, Store, UserRepository};
use crate::{OrderId, ProductId, Result, StoreError, UserId};

/// What a checkout purchases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderSource {
    /// The buyer's current cart, captured when checkout starts. The cart is
    /// cleared once the order exists.
    Cart,
    /// An explicit line set. The cart is left alone.
    Lines(Vec<(ProductId, Quantity)>),
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub source: OrderSource,
    pub payment_method: String,
    pub initial_status: OrderStatus,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

pub(super) fn order_error(e: OrderError) -> StoreError {
    match e {
        OrderError::InvalidTransition { from, to } => StoreError::InvalidTransition { from, to },
        other => StoreError::Validation(other.to_string()),
    }
}

/// Fold repeated products into one line, keeping first-seen order.
fn merge_lines(lines: Vec<(ProductId, Quantity)>) -> Result<Vec<(ProductId, Quantity)>> {
    let mut index: HashMap<ProductId, usize> = HashMap::new();
    let mut merged: Vec<(ProductId, Quantity)> = Vec::with_capacity(lines.len());
    for (product_id, quantity) in lines {
        match index.get(&product_id) {
            Some(&i) => {
                merged[i].1 = merged[i].1.checked_add(quantity).map_err(|e| StoreError::Validation(format!("product {product_id}: {e}")))?;
            }
            None => {
                index.insert(product_id, merged.len());
                merged.push((product_id, quantity));
            }
        }
    }
    Ok(merged)
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    catalog: CatalogService,
    carts: CartService,
    publisher: EventPublisher,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, catalog: CatalogService, carts: CartService, publisher: EventPublisher) -> Self {
        Self { store, catalog, carts, publisher }
    }

    /// Price the user's cart against the live catalog and remember the total
    /// on the user record until an order is placed.
    pub async fn quote(&self, identity: &Identity, user_id: UserId) -> Result<Money> {
        let view = self.carts.view_cart(identity, user_id).await?;
        self.store.set_pending_total(user_id, view.total).await?.ok_or(StoreError::UserNotFound(user_id))?;
        info!(%user_id, total = %view.total, "checkout quoted");
        Ok(view.total)
    }

    pub async fn place_order(&self, identity: &Identity, user_id: UserId, req: PlaceOrder) -> Result<Order> {
        identity.require_owner_or_privileged(user_id, "place order")?;
        if !req.initial_status.is_initial() {
            return Err(order_error(OrderError::InvalidInitialStatus(req.initial_status)));
        }
        if req.payment_method.trim().is_empty() {
            return Err(order_error(OrderError::MissingPaymentMethod));
        }
        let from_cart = req.source == OrderSource::Cart;
        let snapshot = match req.source {
            OrderSource::Cart => self.store.get_cart(user_id).await?.snapshot(),
            OrderSource::Lines(lines) => merge_lines(lines)?,
        };
        if snapshot.is_empty() {
            return Err(order_error(OrderError::NoItems));
        }

        let mut applied: Vec<(ProductId, Quantity)> = Vec::with_capacity(snapshot.len());
        let mut lines = Vec::with_capacity(snapshot.len());
        for (product_id, quantity) in snapshot {
            match self.catalog.adjust_stock(product_id, quantity.as_decrement()).await {
                Ok(product) => {
                    applied.push((product_id, quantity));
                    lines.push(OrderLine { product_id, label: product.label, unit_price: product.price, quantity });
                }
                Err(e) => {
                    self.roll_back(user_id, &applied).await;
                    return Err(e);
                }
            }
        }

        let order = match self.record_order(user_id, req.payment_method, req.initial_status, lines).await {
            Ok(order) => order,
            Err(e) => {
                self.roll_back(user_id, &applied).await;
                return Err(e);
            }
        };

        if from_cart {
            if let Err(e) = self.store.clear_cart(user_id).await {
                warn!(%user_id, transaction_number = %order.transaction_number, error = %e, "order placed but cart was not cleared");
            }
        }
        if let Err(e) = self.store.set_pending_total(user_id, Money::ZERO).await {
            warn!(%user_id, error = %e, "failed to reset pending total");
        }

        info!(
            order_id = %order.id,
            %user_id,
            transaction_number = %order.transaction_number,
            total = %order.total_price,
            lines = order.lines.len(),
            "order placed"
        );
        self.publisher
            .publish([DomainEvent::Order(OrderEvent::Placed {
                order_id: order.id,
                user_id,
                transaction_number: order.transaction_number.clone(),
                total: order.total_price,
            })])
            .await;
        Ok(order)
    }

    async fn record_order(&self, user_id: UserId, payment_method: String, initial: OrderStatus, lines: Vec<OrderLine>) -> Result<Order> {
        let txn = self.store.next_transaction_number().await?;
        let order = Order::place(user_id, txn, payment_method, initial, lines).map_err(order_error)?;
        self.store.insert_order(&order).await?;
        Ok(order)
    }

    /// Reverse decrements in the opposite order they were applied.
    async fn roll_back(&self, user_id: UserId, applied: &[(ProductId, Quantity)]) {
        if applied.is_empty() { return; }
        warn!(%user_id, lines = applied.len(), "checkout failed, restoring stock");
        for &(product_id, quantity) in applied.iter().rev() {
            if let Err(e) = self.catalog.adjust_stock(product_id, quantity.as_increment()).await {
                error!(%product_id, quantity = quantity.value(), error = %e, "stock rollback failed");
            }
        }
    }

    async fn load(&self, id: OrderId) -> Result<Order> {
        self.store.get_order(id).await?.ok_or_else(|| StoreError::OrderNotFound(id.to_string()))
    }

    pub async fn get_order(&self, identity: &Identity, id: OrderId) -> Result<Order> {
        let order = self.load(id).await?;
        identity.require_owner_or_privileged(order.user_id, "view order")?;
        Ok(order)
    }

    pub async fn find_by_transaction(&self, identity: &Identity, txn: &TransactionNumber) -> Result<Order> {
        let order = self
            .store
            .find_order_by_transaction(txn)
            .await?
            .ok_or_else(|| StoreError::OrderNotFound(txn.to_string()))?;
        identity.require_owner_or_privileged(order.user_id, "view order")?;
        Ok(order)
    }

    /// The caller's own order history.
    pub async fn list_orders(&self, identity: &Identity) -> Result<Vec<Order>> {
        self.store.list_orders(Some(identity.user_id)).await
    }

    pub async fn list_all_orders(&self, identity: &Identity) -> Result<Vec<Order>> {
        identity.require_privileged("view all orders")?;
        self.store.list_orders(None).await
    }

    /// Move an order forward through its status machine.
    ///
    /// Privileged callers may apply any forward transition. A buyer may only
    /// confirm payment on their own order. `Cancelled` is never a valid
    /// target here; orders are cancelled by refund approval.
    pub async fn update_order_status(&self, identity: &Identity, id: OrderId, next: OrderStatus) -> Result<Order> {
        let order = self.load(id).await?;
        let confirming = order.status == OrderStatus::PendingUserConfirmation && next == OrderStatus::Paid;
        if !identity.is_privileged() && !(confirming && order.is_owned_by(identity.user_id)) {
            return Err(StoreError::Unauthorized("order status changes require staff, employee or admin role".into()));
        }
        let from = order.status;
        let mut target = order;
        target.transition_to(next).map_err(order_error)?;

        let Some(updated) = self.store.update_order_status(id, from, next).await? else {
            let current = self.load(id).await?;
            return Err(StoreError::InvalidTransition { from: current.status, to: next });
        };
        info!(order_id = %id, %from, to = %next, "order status changed");
        self.publisher
            .publish([DomainEvent::Order(OrderEvent::StatusChanged { order_id: id, from, to: next })])
            .await;
        Ok(updated)
    }

    /// Clerical correction: drop lines and recompute the total from the
    /// remaining purchase-time prices. Stock is not restored.
    pub async fn remove_order_lines(&self, identity: &Identity, id: OrderId, product_ids: &[ProductId]) -> Result<Order> {
        identity.require_privileged("remove order lines")?;
        if product_ids.is_empty() {
            return Err(StoreError::Validation("no products given".into()));
        }
        let (order, removed) = self
            .store
            .remove_order_lines(id, product_ids)
            .await?
            .ok_or_else(|| StoreError::OrderNotFound(id.to_string()))?;
        info!(order_id = %id, removed, total = %order.total_price, "order lines removed");
        if removed > 0 {
            self.publisher
                .publish([DomainEvent::Order(OrderEvent::LinesRemoved { order_id: id, removed, total: order.total_price })])
                .await;
        }
        Ok(order)
    }
}
