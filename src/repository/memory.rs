//! In-memory store backed by tokio `RwLock`ed maps.
//!
//! Each mutation holds the write lock of its table for the whole
//! read-modify-write, which makes it atomic with respect to other callers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{CartRepository, CatalogRepository, OrderRepository, RefundRepository, UserRepository};
use crate::domain::aggregates::{
    Approval, Cart, CartError, DeletedProduct, Order, OrderStatus, Product, ProductError, Refund, Role, User,
};
use crate::domain::value_objects::{Money, Quantity, TransactionNumber};
use crate::{LineId, OrderId, ProductId, RefundId, Result, StoreError, UserId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<ProductId, Product>>,
    deleted: RwLock<Vec<DeletedProduct>>,
    carts: RwLock<HashMap<UserId, Cart>>,
    orders: RwLock<HashMap<OrderId, Order>>,
    refunds: RwLock<HashMap<RefundId, Refund>>,
    users: RwLock<HashMap<UserId, User>>,
    transaction_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn cart_error(e: CartError) -> StoreError {
    match e {
        CartError::LineNotFound(id) => StoreError::LineNotFound(id),
        CartError::InvalidQuantity(e) => StoreError::Validation(e.to_string()),
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.products.write().await.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut list: Vec<Product> = products
            .values()
            .filter(|p| category.map_or(true, |c| p.category.as_deref() == Some(c)))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.label.cmp(&b.label).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn update_product_details(&self, product: &Product) -> Result<Option<Product>> {
        let mut products = self.products.write().await;
        let Some(stored) = products.get_mut(&product.id) else { return Ok(None) };
        stored.label = product.label.clone();
        stored.price = product.price;
        stored.category = product.category.clone();
        stored.photo = product.photo.clone();
        stored.updated_at = product.updated_at;
        Ok(Some(stored.clone()))
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product> {
        let mut products = self.products.write().await;
        let product = products.get_mut(&id).ok_or(StoreError::ProductNotFound(id))?;
        product.apply_stock_delta(delta).map_err(|e| match e {
            ProductError::InsufficientStock { available, requested } => {
                StoreError::InsufficientStock { product_id: id, available, requested }
            }
            other => StoreError::Validation(other.to_string()),
        })?;
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId, reason: &str) -> Result<Option<DeletedProduct>> {
        let Some(product) = self.products.write().await.remove(&id) else { return Ok(None) };
        let record = product.into_deleted(reason);
        self.deleted.write().await.push(record.clone());
        Ok(Some(record))
    }

    async fn list_deleted_products(&self) -> Result<Vec<DeletedProduct>> {
        Ok(self.deleted.read().await.clone())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.carts.read().await.get(&user_id).cloned().unwrap_or_else(|| Cart::new(user_id)))
    }

    async fn merge_line(&self, user_id: UserId, product_id: ProductId, quantity: Quantity) -> Result<Cart> {
        let mut carts = self.carts.write().await;
        let cart = carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        cart.add_item(product_id, quantity).map_err(cart_error)?;
        Ok(cart.clone())
    }

    async fn set_line_quantity(&self, user_id: UserId, line_id: LineId, quantity: u32) -> Result<Cart> {
        let mut carts = self.carts.write().await;
        let cart = carts.get_mut(&user_id).ok_or(StoreError::LineNotFound(line_id))?;
        cart.set_quantity(line_id, quantity).map_err(cart_error)?;
        Ok(cart.clone())
    }

    async fn remove_line(&self, user_id: UserId, line_id: LineId) -> Result<Cart> {
        let mut carts = self.carts.write().await;
        let cart = carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        cart.remove_line(line_id);
        Ok(cart.clone())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        if let Some(cart) = self.carts.write().await.get_mut(&user_id) {
            cart.clear();
        }
        Ok(())
    }

    async fn purge_product(&self, product_id: ProductId) -> Result<u64> {
        let mut carts = self.carts.write().await;
        let mut purged = 0;
        for cart in carts.values_mut() {
            if cart.purge_product(product_id) { purged += 1; }
        }
        Ok(purged)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn next_transaction_number(&self) -> Result<TransactionNumber> {
        let seq = self.transaction_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TransactionNumber::from_sequence(seq))
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.values().any(|o| o.transaction_number == order.transaction_number) {
            return Err(StoreError::Storage(format!("duplicate transaction number {}", order.transaction_number)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_order_by_transaction(&self, txn: &TransactionNumber) -> Result<Option<Order>> {
        Ok(self.orders.read().await.values().find(|o| &o.transaction_number == txn).cloned())
    }

    async fn list_orders(&self, user_id: Option<UserId>) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut list: Vec<Order> = orders
            .values()
            .filter(|o| user_id.map_or(true, |u| o.user_id == u))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn update_order_status(&self, id: OrderId, expected: OrderStatus, next: OrderStatus) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.status = next;
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn remove_order_lines(&self, id: OrderId, product_ids: &[ProductId]) -> Result<Option<(Order, usize)>> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id) else { return Ok(None) };
        let removed = order.remove_lines(product_ids);
        Ok(Some((order.clone(), removed)))
    }
}

#[async_trait]
impl RefundRepository for MemoryStore {
    async fn insert_refund(&self, refund: &Refund) -> Result<()> {
        let mut refunds = self.refunds.write().await;
        if refunds.values().any(|r| r.transaction_number == refund.transaction_number) {
            return Err(StoreError::RefundExists(refund.transaction_number.clone()));
        }
        refunds.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>> {
        Ok(self.refunds.read().await.get(&id).cloned())
    }

    async fn list_refunds(&self, submitted_by: Option<UserId>) -> Result<Vec<Refund>> {
        let refunds = self.refunds.read().await;
        let mut list: Vec<Refund> = refunds
            .values()
            .filter(|r| submitted_by.map_or(true, |u| r.submitted_by == u))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.date_cancelled.cmp(&a.date_cancelled).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn update_approval(&self, id: RefundId, expected: Approval, next: Approval) -> Result<Option<Refund>> {
        let mut refunds = self.refunds.write().await;
        match refunds.get_mut(&id) {
            Some(refund) if refund.approval == expected => {
                refund.approval = next;
                Ok(Some(refund.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.id_number == user.id_number || u.email == user.email) {
            return Err(StoreError::Validation("id number or email already registered".into()));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut list: Vec<User> = self.users.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn update_user(&self, user: &User) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.id != user.id && u.email == user.email) {
            return Err(StoreError::Validation("email already registered".into()));
        }
        let Some(stored) = users.get_mut(&user.id) else { return Ok(None) };
        stored.first_name = user.first_name.clone();
        stored.last_name = user.last_name.clone();
        stored.email = user.email.clone();
        stored.phone_number = user.phone_number.clone();
        Ok(Some(stored.clone()))
    }

    async fn delete_user(&self, id: UserId) -> Result<Option<User>> {
        let Some(user) = self.users.write().await.remove(&id) else { return Ok(None) };
        self.carts.write().await.remove(&id);
        Ok(Some(user))
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|u| {
            u.role = role;
            u.clone()
        }))
    }

    async fn set_pending_total(&self, id: UserId, total: Money) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|u| {
            u.pending_total = total;
            u.clone()
        }))
    }
}
