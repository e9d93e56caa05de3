//! Storage ports.
//!
//! Every method is a bounded number of record reads/writes. Methods that
//! mutate shared state (`adjust_stock`, `merge_line`, the `update_*`
//! compare-and-set methods) are atomic per record in every adapter.

use async_trait::async_trait;

use crate::domain::aggregates::{
    Approval, Cart, DeletedProduct, Order, OrderStatus, Product, Refund, Role, User,
};
use crate::domain::value_objects::{Money, Quantity, TransactionNumber};
use crate::{LineId, OrderId, ProductId, RefundId, Result, UserId};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>>;
    /// Persist label, price, category and photo. Stock is never written here.
    async fn update_product_details(&self, product: &Product) -> Result<Option<Product>>;
    /// Apply `stock += delta` as a single guarded read-modify-write.
    ///
    /// Fails with `InsufficientStock` when the result would be negative and
    /// `ProductNotFound` when the product is unknown.
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product>;
    async fn delete_product(&self, id: ProductId, reason: &str) -> Result<Option<DeletedProduct>>;
    async fn list_deleted_products(&self) -> Result<Vec<DeletedProduct>>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn get_cart(&self, user_id: UserId) -> Result<Cart>;
    /// Add `quantity` to the user's line for `product_id`, creating it if absent.
    async fn merge_line(&self, user_id: UserId, product_id: ProductId, quantity: Quantity) -> Result<Cart>;
    /// Set an absolute quantity; zero removes the line.
    async fn set_line_quantity(&self, user_id: UserId, line_id: LineId, quantity: u32) -> Result<Cart>;
    async fn remove_line(&self, user_id: UserId, line_id: LineId) -> Result<Cart>;
    async fn clear_cart(&self, user_id: UserId) -> Result<()>;
    /// Remove lines for `product_id` from every cart. Returns the number of lines removed.
    async fn purge_product(&self, product_id: ProductId) -> Result<u64>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn next_transaction_number(&self) -> Result<TransactionNumber>;
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;
    async fn find_order_by_transaction(&self, txn: &TransactionNumber) -> Result<Option<Order>>;
    /// Orders for one user, or every order when `user_id` is `None`. Newest first.
    async fn list_orders(&self, user_id: Option<UserId>) -> Result<Vec<Order>>;
    /// Compare-and-set on the status. `None` when the order is missing or no
    /// longer in `expected`.
    async fn update_order_status(&self, id: OrderId, expected: OrderStatus, next: OrderStatus) -> Result<Option<Order>>;
    /// Remove lines for the given products and recompute the total.
    /// Returns the updated order and the number of removed lines.
    async fn remove_order_lines(&self, id: OrderId, product_ids: &[ProductId]) -> Result<Option<(Order, usize)>>;
}

#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Fails with `RefundExists` when the transaction already has a refund.
    async fn insert_refund(&self, refund: &Refund) -> Result<()>;
    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>>;
    async fn list_refunds(&self, submitted_by: Option<UserId>) -> Result<Vec<Refund>>;
    /// Compare-and-set on the approval state.
    async fn update_approval(&self, id: RefundId, expected: Approval, next: Approval) -> Result<Option<Refund>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;
    /// Every user, oldest registration first.
    async fn list_users(&self) -> Result<Vec<User>>;
    /// Persist names, email and phone number. Role and pending total are
    /// written by their own methods.
    async fn update_user(&self, user: &User) -> Result<Option<User>>;
    /// Remove the user and their cart.
    async fn delete_user(&self, id: UserId) -> Result<Option<User>>;
    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<User>>;
    async fn set_pending_total(&self, id: UserId, total: Money) -> Result<Option<User>>;
}

/// Everything the services need from a backend.
pub trait Store: CatalogRepository + CartRepository + OrderRepository + RefundRepository + UserRepository {}

impl<T> Store for T where T: CatalogRepository + CartRepository + OrderRepository + RefundRepository + UserRepository {}
