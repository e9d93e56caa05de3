//! Refund approval when the order or the catalog changes underneath it.

use std::sync::Arc;

use async_trait::async_trait;
use campus_store::domain::aggregates::{
    Approval, Cart, DeletedProduct, Order, OrderStatus, Product, Refund, Role, User,
};
use campus_store::domain::value_objects::{Money, Quantity, TransactionNumber};
use campus_store::repository::{
    CartRepository, CatalogRepository, MemoryStore, OrderRepository, RefundRepository, UserRepository,
};
use campus_store::services::{EventPublisher, Identity, OrderSource, PlaceOrder, Services, SubmitRefund};
use campus_store::{LineId, OrderId, ProductId, RefundId, Result, StoreError, UserId};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

/// What happens to the store just as an approval tries to cancel the order.
#[derive(Debug, Clone, Copy)]
enum Interference {
    /// Staff confirm payment and another buyer takes every remaining unit.
    PaidAndSoldOut,
    /// The product is removed from the catalog once the order is cancelled.
    ProductDeleted(ProductId),
}

/// Memory store that fires one [`Interference`] on the first write to `Cancelled`.
struct ContendedStore {
    inner: MemoryStore,
    pending: Mutex<Option<Interference>>,
    sold: Mutex<i64>,
}

impl ContendedStore {
    fn new(interference: Interference) -> Self {
        Self { inner: MemoryStore::new(), pending: Mutex::new(Some(interference)), sold: Mutex::new(0) }
    }

    async fn sold(&self) -> i64 { *self.sold.lock().await }
}

#[async_trait]
impl CatalogRepository for ContendedStore {
    async fn insert_product(&self, product: &Product) -> Result<()> { self.inner.insert_product(product).await }
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> { self.inner.get_product(id).await }
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> { self.inner.list_products(category).await }
    async fn update_product_details(&self, product: &Product) -> Result<Option<Product>> { self.inner.update_product_details(product).await }
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product> { self.inner.adjust_stock(id, delta).await }
    async fn delete_product(&self, id: ProductId, reason: &str) -> Result<Option<DeletedProduct>> { self.inner.delete_product(id, reason).await }
    async fn list_deleted_products(&self) -> Result<Vec<DeletedProduct>> { self.inner.list_deleted_products().await }
}

#[async_trait]
impl CartRepository for ContendedStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Cart> { self.inner.get_cart(user_id).await }
    async fn merge_line(&self, user_id: UserId, product_id: ProductId, quantity: Quantity) -> Result<Cart> { self.inner.merge_line(user_id, product_id, quantity).await }
    async fn set_line_quantity(&self, user_id: UserId, line_id: LineId, quantity: u32) -> Result<Cart> { self.inner.set_line_quantity(user_id, line_id, quantity).await }
    async fn remove_line(&self, user_id: UserId, line_id: LineId) -> Result<Cart> { self.inner.remove_line(user_id, line_id).await }
    async fn clear_cart(&self, user_id: UserId) -> Result<()> { self.inner.clear_cart(user_id).await }
    async fn purge_product(&self, product_id: ProductId) -> Result<u64> { self.inner.purge_product(product_id).await }
}

#[async_trait]
impl OrderRepository for ContendedStore {
    async fn next_transaction_number(&self) -> Result<TransactionNumber> { self.inner.next_transaction_number().await }
    async fn insert_order(&self, order: &Order) -> Result<()> { self.inner.insert_order(order).await }
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> { self.inner.get_order(id).await }
    async fn find_order_by_transaction(&self, txn: &TransactionNumber) -> Result<Option<Order>> { self.inner.find_order_by_transaction(txn).await }
    async fn list_orders(&self, user_id: Option<UserId>) -> Result<Vec<Order>> { self.inner.list_orders(user_id).await }

    async fn update_order_status(&self, id: OrderId, expected: OrderStatus, next: OrderStatus) -> Result<Option<Order>> {
        let fired = if next == OrderStatus::Cancelled { self.pending.lock().await.take() } else { None };
        match fired {
            Some(Interference::PaidAndSoldOut) => {
                self.inner.update_order_status(id, expected, OrderStatus::Paid).await?;
                if let Some(order) = self.inner.get_order(id).await? {
                    for line in &order.lines {
                        let Some(product) = self.inner.get_product(line.product_id).await? else { continue };
                        self.inner.adjust_stock(product.id, -product.stock).await?;
                        *self.sold.lock().await += product.stock;
                    }
                }
                self.inner.update_order_status(id, expected, next).await
            }
            Some(Interference::ProductDeleted(product_id)) => {
                let updated = self.inner.update_order_status(id, expected, next).await?;
                self.inner.delete_product(product_id, "recalled").await?;
                Ok(updated)
            }
            None => self.inner.update_order_status(id, expected, next).await,
        }
    }

    async fn remove_order_lines(&self, id: OrderId, product_ids: &[ProductId]) -> Result<Option<(Order, usize)>> { self.inner.remove_order_lines(id, product_ids).await }
}

#[async_trait]
impl RefundRepository for ContendedStore {
    async fn insert_refund(&self, refund: &Refund) -> Result<()> { self.inner.insert_refund(refund).await }
    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>> { self.inner.get_refund(id).await }
    async fn list_refunds(&self, submitted_by: Option<UserId>) -> Result<Vec<Refund>> { self.inner.list_refunds(submitted_by).await }
    async fn update_approval(&self, id: RefundId, expected: Approval, next: Approval) -> Result<Option<Refund>> { self.inner.update_approval(id, expected, next).await }
}

#[async_trait]
impl UserRepository for ContendedStore {
    async fn insert_user(&self, user: &User) -> Result<()> { self.inner.insert_user(user).await }
    async fn get_user(&self, id: UserId) -> Result<Option<User>> { self.inner.get_user(id).await }
    async fn list_users(&self) -> Result<Vec<User>> { self.inner.list_users().await }
    async fn update_user(&self, user: &User) -> Result<Option<User>> { self.inner.update_user(user).await }
    async fn delete_user(&self, id: UserId) -> Result<Option<User>> { self.inner.delete_user(id).await }
    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<User>> { self.inner.set_role(id, role).await }
    async fn set_pending_total(&self, id: UserId, total: Money) -> Result<Option<User>> { self.inner.set_pending_total(id, total).await }
}

async fn product(store: &ContendedStore, label: &str, stock: i64) -> Product {
    let p = Product::create(label, Money::new(Decimal::new(1500, 2)).unwrap(), stock).unwrap();
    store.insert_product(&p).await.unwrap();
    p
}

async fn stock(store: &ContendedStore, id: ProductId) -> i64 {
    store.get_product(id).await.unwrap().unwrap().stock
}

/// Places an order for `items` and files a refund against it.
async fn refund_for(svc: &Services, buyer: &Identity, items: &[(ProductId, u32)]) -> (Order, Refund) {
    let req = PlaceOrder {
        source: OrderSource::Lines(items.iter().map(|&(p, n)| (p, Quantity::new(n).unwrap())).collect()),
        payment_method: "cash".into(),
        initial_status: OrderStatus::PendingUserConfirmation,
    };
    let order = svc.checkout.place_order(buyer, buyer.user_id, req).await.unwrap();
    let submit = SubmitRefund { transaction_number: order.transaction_number.clone(), reason: "wrong size".into(), date_cancelled: None };
    let refund = svc.refunds.submit_refund(buyer, submit).await.unwrap();
    (order, refund)
}

#[tokio::test]
async fn test_approval_losing_order_race_moves_no_stock() {
    let store = Arc::new(ContendedStore::new(Interference::PaidAndSoldOut));
    let svc = Services::new(store.clone(), EventPublisher::recording());
    let buyer = Identity::new(Uuid::now_v7(), Role::Student);
    let staff = Identity::new(Uuid::now_v7(), Role::Staff);
    let hoodie = product(&store, "Hoodie", 5).await;
    let (order, refund) = refund_for(&svc, &buyer, &[(hoodie.id, 2)]).await;

    let err = svc.refunds.approve_refund(&staff, refund.id).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { from: OrderStatus::Paid, to: OrderStatus::Cancelled }));
    assert_eq!(stock(&store, hoodie.id).await, 0);
    assert_eq!(store.get_refund(refund.id).await.unwrap().unwrap().approval, Approval::Pending);
    assert_eq!(store.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Paid);

    let approved = svc.refunds.approve_refund(&staff, refund.id).await.unwrap();
    assert_eq!(approved.approval, Approval::Approved);
    assert_eq!(stock(&store, hoodie.id).await, 2);
    assert_eq!(stock(&store, hoodie.id).await + store.sold().await, 5);
}

#[tokio::test]
async fn test_failed_restore_reverts_order_and_refund() {
    let mug = Product::create("Mug", Money::new(Decimal::new(800, 2)).unwrap(), 5).unwrap();
    let store = Arc::new(ContendedStore::new(Interference::ProductDeleted(mug.id)));
    store.insert_product(&mug).await.unwrap();
    let svc = Services::new(store.clone(), EventPublisher::recording());
    let buyer = Identity::new(Uuid::now_v7(), Role::Student);
    let staff = Identity::new(Uuid::now_v7(), Role::Staff);
    let pen = product(&store, "Pen", 5).await;
    let (order, refund) = refund_for(&svc, &buyer, &[(pen.id, 1), (mug.id, 1)]).await;

    let err = svc.refunds.approve_refund(&staff, refund.id).await.unwrap_err();
    assert!(matches!(err, StoreError::ProductNotFound(id) if id == mug.id));
    assert_eq!(stock(&store, pen.id).await, 4);
    assert_eq!(store.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::PendingUserConfirmation);
    assert_eq!(store.get_refund(refund.id).await.unwrap().unwrap().approval, Approval::Pending);
}
