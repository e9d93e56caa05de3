//! Postgres store.
//!
//! Stock adjustment is a single conditional `UPDATE` guarded on the
//! non-negativity of the result, so concurrent checkouts cannot jointly
//! overdraw a product. Cart merges rely on `ON CONFLICT ... DO UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::fmt::Display;
use uuid::Uuid;

use super::{CartRepository, CatalogRepository, OrderRepository, RefundRepository, UserRepository};
use crate::domain::aggregates::{
    Approval, Cart, CartLine, DeletedProduct, Order, OrderLine, OrderStatus, Product, Refund, Role, User,
};
use crate::domain::value_objects::{Money, Quantity, QuantityError, TransactionNumber};
use crate::{LineId, OrderId, ProductId, RefundId, Result, StoreError, UserId};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn corrupt(e: impl Display) -> StoreError {
    StoreError::Storage(format!("corrupt row: {e}"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    label: String,
    price: Decimal,
    stock: i64,
    category: Option<String>,
    photo: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id, label: r.label, price: Money::new(r.price).map_err(corrupt)?, stock: r.stock,
            category: r.category, photo: r.photo, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeletedProductRow {
    product_id: Uuid,
    label: String,
    reason: String,
    deleted_at: DateTime<Utc>,
}

impl From<DeletedProductRow> for DeletedProduct {
    fn from(r: DeletedProductRow) -> Self {
        DeletedProduct { product_id: r.product_id, label: r.label, reason: r.reason, deleted_at: r.deleted_at }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i32,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    transaction_number: String,
    created_at: DateTime<Utc>,
    total_price: Decimal,
    payment_method: String,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderLineRow {
    order_id: Uuid,
    product_id: Uuid,
    label: String,
    unit_price: Decimal,
    quantity: i32,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = StoreError;
    fn try_from(r: OrderLineRow) -> Result<Self> {
        Ok(OrderLine {
            product_id: r.product_id,
            label: r.label,
            unit_price: Money::new(r.unit_price).map_err(corrupt)?,
            quantity: Quantity::try_from(r.quantity).map_err(corrupt)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    transaction_number: String,
    date_cancelled: DateTime<Utc>,
    reason: String,
    submitted_by: Uuid,
    approval: String,
}

impl TryFrom<RefundRow> for Refund {
    type Error = StoreError;
    fn try_from(r: RefundRow) -> Result<Self> {
        Ok(Refund {
            id: r.id,
            transaction_number: TransactionNumber::parse(r.transaction_number).map_err(corrupt)?,
            date_cancelled: r.date_cancelled,
            reason: r.reason,
            submitted_by: r.submitted_by,
            approval: r.approval.parse().map_err(corrupt)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    id_number: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    email: String,
    phone_number: String,
    role: String,
    pending_total: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;
    fn try_from(r: UserRow) -> Result<Self> {
        Ok(User {
            id: r.id,
            id_number: u64::try_from(r.id_number).map_err(corrupt)?,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            phone_number: r.phone_number,
            role: r.role.parse().map_err(corrupt)?,
            pending_total: Money::new(r.pending_total).map_err(corrupt)?,
            created_at: r.created_at,
        })
    }
}

/// Stitch order rows and their line rows back into aggregates, keeping the
/// order of `rows`.
fn assemble_orders(rows: Vec<OrderRow>, lines: Vec<OrderLineRow>) -> Result<Vec<Order>> {
    let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for line in lines {
        let order_id = line.order_id;
        by_order.entry(order_id).or_default().push(line.try_into()?);
    }
    rows.into_iter()
        .map(|r| -> Result<Order> {
            Ok(Order {
                id: r.id,
                user_id: r.user_id,
                transaction_number: TransactionNumber::parse(r.transaction_number).map_err(corrupt)?,
                created_at: r.created_at,
                total_price: Money::new(r.total_price).map_err(corrupt)?,
                payment_method: r.payment_method,
                status: r.status.parse::<OrderStatus>().map_err(corrupt)?,
                lines: by_order.remove(&r.id).unwrap_or_default(),
            })
        })
        .collect()
}

impl PgStore {
    async fn load_orders(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        if rows.is_empty() { return Ok(vec![]); }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let lines = sqlx::query_as::<_, OrderLineRow>(
            "SELECT order_id, product_id, label, unit_price, quantity FROM order_lines WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        assemble_orders(rows, lines)
    }

    async fn load_order(&self, row: Option<OrderRow>) -> Result<Option<Order>> {
        let Some(row) = row else { return Ok(None) };
        Ok(self.load_orders(vec![row]).await?.into_iter().next())
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl CatalogRepository for PgStore {
    async fn insert_product(&self, p: &Product) -> Result<()> {
        sqlx::query("INSERT INTO products (id, label, price, stock, category, photo, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(p.id).bind(&p.label).bind(p.price.amount()).bind(p.stock).bind(&p.category).bind(&p.photo).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }

    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE ($1::text IS NULL OR category = $1) ORDER BY label, id")
            .bind(category).fetch_all(&self.pool).await?
            .into_iter().map(Product::try_from).collect()
    }

    async fn update_product_details(&self, p: &Product) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("UPDATE products SET label = $2, price = $3, category = $4, photo = $5, updated_at = $6 WHERE id = $1 RETURNING *")
            .bind(p.id).bind(&p.label).bind(p.price.amount()).bind(&p.category).bind(&p.photo).bind(p.updated_at)
            .fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product> {
        let updated = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1 AND stock + $2 >= 0 RETURNING *",
        )
        .bind(id).bind(delta)
        .fetch_optional(&self.pool).await?;
        if let Some(row) = updated {
            return row.try_into();
        }
        let current: Option<(i64,)> = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        match current {
            Some((available,)) => Err(StoreError::InsufficientStock { product_id: id, available, requested: -delta }),
            None => Err(StoreError::ProductNotFound(id)),
        }
    }

    async fn delete_product(&self, id: ProductId, reason: &str) -> Result<Option<DeletedProduct>> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query_as::<_, ProductRow>("DELETE FROM products WHERE id = $1 RETURNING *")
            .bind(id).fetch_optional(&mut *tx).await?;
        let Some(row) = removed else { return Ok(None) };
        let record = Product::try_from(row)?.into_deleted(reason);
        sqlx::query("INSERT INTO deleted_products (product_id, label, reason, deleted_at) VALUES ($1, $2, $3, $4)")
            .bind(record.product_id).bind(&record.label).bind(&record.reason).bind(record.deleted_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(Some(record))
    }

    async fn list_deleted_products(&self) -> Result<Vec<DeletedProduct>> {
        let rows = sqlx::query_as::<_, DeletedProductRow>("SELECT product_id, label, reason, deleted_at FROM deleted_products ORDER BY deleted_at")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(DeletedProduct::from).collect())
    }
}

// =============================================================================
// Carts
// =============================================================================

#[async_trait]
impl CartRepository for PgStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        let rows = sqlx::query_as::<_, CartLineRow>("SELECT id, product_id, quantity, updated_at FROM cart_lines WHERE user_id = $1 ORDER BY created_at, id")
            .bind(user_id).fetch_all(&self.pool).await?;
        let mut cart = Cart::new(user_id);
        if let Some(latest) = rows.iter().map(|r| r.updated_at).max() {
            cart.updated_at = latest;
        }
        cart.lines = rows
            .into_iter()
            .map(|r| -> Result<CartLine> {
                Ok(CartLine { id: r.id, product_id: r.product_id, quantity: Quantity::try_from(r.quantity).map_err(corrupt)? })
            })
            .collect::<Result<_>>()?;
        Ok(cart)
    }

    async fn merge_line(&self, user_id: UserId, product_id: ProductId, quantity: Quantity) -> Result<Cart> {
        let result = sqlx::query("INSERT INTO cart_lines (id, user_id, product_id, quantity, created_at, updated_at) VALUES ($1, $2, $3, $4, NOW(), NOW()) ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity, updated_at = NOW() WHERE cart_lines.quantity::bigint + EXCLUDED.quantity <= $5")
            .bind(Uuid::now_v7()).bind(user_id).bind(product_id).bind(i32::from(quantity)).bind(i64::from(Quantity::MAX))
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Validation(format!("cart line quantity would exceed {}", Quantity::MAX)));
        }
        self.get_cart(user_id).await
    }

    async fn set_line_quantity(&self, user_id: UserId, line_id: LineId, quantity: u32) -> Result<Cart> {
        let result = match Quantity::new(quantity) {
            Ok(q) => sqlx::query("UPDATE cart_lines SET quantity = $3, updated_at = NOW() WHERE id = $1 AND user_id = $2")
                .bind(line_id).bind(user_id).bind(i32::from(q))
                .execute(&self.pool).await?,
            Err(QuantityError::Zero) => sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND user_id = $2")
                .bind(line_id).bind(user_id)
                .execute(&self.pool).await?,
            Err(e) => return Err(StoreError::Validation(e.to_string())),
        };
        if result.rows_affected() == 0 {
            return Err(StoreError::LineNotFound(line_id));
        }
        self.get_cart(user_id).await
    }

    async fn remove_line(&self, user_id: UserId, line_id: LineId) -> Result<Cart> {
        sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND user_id = $2")
            .bind(line_id).bind(user_id).execute(&self.pool).await?;
        self.get_cart(user_id).await
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn purge_product(&self, product_id: ProductId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE product_id = $1").bind(product_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Orders
// =============================================================================

const ORDER_COLUMNS: &str = "id, user_id, transaction_number, created_at, total_price, payment_method, status";

#[async_trait]
impl OrderRepository for PgStore {
    async fn next_transaction_number(&self) -> Result<TransactionNumber> {
        let (seq,): (i64,) = sqlx::query_as("SELECT nextval('transaction_number_seq')").fetch_one(&self.pool).await?;
        Ok(TransactionNumber::from_sequence(u64::try_from(seq).map_err(corrupt)?))
    }

    async fn insert_order(&self, o: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO orders (id, user_id, transaction_number, created_at, total_price, payment_method, status) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(o.id).bind(o.user_id).bind(o.transaction_number.as_str()).bind(o.created_at)
            .bind(o.total_price.amount()).bind(&o.payment_method).bind(o.status.as_str())
            .execute(&mut *tx).await?;
        for (position, line) in o.lines.iter().enumerate() {
            sqlx::query("INSERT INTO order_lines (order_id, position, product_id, label, unit_price, quantity) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(o.id).bind(position as i32).bind(line.product_id).bind(&line.label)
                .bind(line.unit_price.amount()).bind(i32::from(line.quantity))
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        self.load_order(row).await
    }

    async fn find_order_by_transaction(&self, txn: &TransactionNumber) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE transaction_number = $1"))
            .bind(txn.as_str()).fetch_optional(&self.pool).await?;
        self.load_order(row).await
    }

    async fn list_orders(&self, user_id: Option<UserId>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id).fetch_all(&self.pool).await?;
        self.load_orders(rows).await
    }

    async fn update_order_status(&self, id: OrderId, expected: OrderStatus, next: OrderStatus) -> Result<Option<Order>> {
        let result = sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id).bind(expected.as_str()).bind(next.as_str())
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Ok(None); }
        self.get_order(id).await
    }

    async fn remove_order_lines(&self, id: OrderId, product_ids: &[ProductId]) -> Result<Option<(Order, usize)>> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id).fetch_optional(&mut *tx).await?;
        if locked.is_none() { return Ok(None); }
        let removed = sqlx::query("DELETE FROM order_lines WHERE order_id = $1 AND product_id = ANY($2)")
            .bind(id).bind(product_ids.to_vec())
            .execute(&mut *tx).await?
            .rows_affected();
        sqlx::query("UPDATE orders SET total_price = (SELECT COALESCE(SUM(unit_price * quantity), 0) FROM order_lines WHERE order_id = $1) WHERE id = $1")
            .bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(self.get_order(id).await?.map(|o| (o, removed as usize)))
    }
}

// =============================================================================
// Refunds
// =============================================================================

#[async_trait]
impl RefundRepository for PgStore {
    async fn insert_refund(&self, r: &Refund) -> Result<()> {
        let result = sqlx::query("INSERT INTO refunds (id, transaction_number, date_cancelled, reason, submitted_by, approval) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(r.id).bind(r.transaction_number.as_str()).bind(r.date_cancelled).bind(&r.reason)
            .bind(r.submitted_by).bind(r.approval.as_str())
            .execute(&self.pool).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::RefundExists(r.transaction_number.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>> {
        sqlx::query_as::<_, RefundRow>("SELECT * FROM refunds WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Refund::try_from).transpose()
    }

    async fn list_refunds(&self, submitted_by: Option<UserId>) -> Result<Vec<Refund>> {
        sqlx::query_as::<_, RefundRow>("SELECT * FROM refunds WHERE ($1::uuid IS NULL OR submitted_by = $1) ORDER BY date_cancelled DESC, id DESC")
            .bind(submitted_by).fetch_all(&self.pool).await?
            .into_iter().map(Refund::try_from).collect()
    }

    async fn update_approval(&self, id: RefundId, expected: Approval, next: Approval) -> Result<Option<Refund>> {
        sqlx::query_as::<_, RefundRow>("UPDATE refunds SET approval = $3 WHERE id = $1 AND approval = $2 RETURNING *")
            .bind(id).bind(expected.as_str()).bind(next.as_str())
            .fetch_optional(&self.pool).await?
            .map(Refund::try_from).transpose()
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserRepository for PgStore {
    async fn insert_user(&self, u: &User) -> Result<()> {
        let id_number = i64::try_from(u.id_number).map_err(|_| StoreError::Validation("id number out of range".into()))?;
        let result = sqlx::query("INSERT INTO users (id, id_number, first_name, last_name, email, phone_number, role, pending_total, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(u.id).bind(id_number).bind(&u.first_name).bind(&u.last_name).bind(&u.email)
            .bind(&u.phone_number).bind(u.role.as_str()).bind(u.pending_total.amount()).bind(u.created_at)
            .execute(&self.pool).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Validation("id number or email already registered".into())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(User::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at, id")
            .fetch_all(&self.pool).await?
            .into_iter().map(User::try_from).collect()
    }

    async fn update_user(&self, u: &User) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, UserRow>("UPDATE users SET first_name = $2, last_name = $3, email = $4, phone_number = $5 WHERE id = $1 RETURNING *")
            .bind(u.id).bind(&u.first_name).bind(&u.last_name).bind(&u.email).bind(&u.phone_number)
            .fetch_optional(&self.pool).await;
        match result {
            Ok(row) => row.map(User::try_from).transpose(),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Validation("email already registered".into())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_user(&self, id: UserId) -> Result<Option<User>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1").bind(id).execute(&mut *tx).await?;
        let removed = sqlx::query_as::<_, UserRow>("DELETE FROM users WHERE id = $1 RETURNING *")
            .bind(id).fetch_optional(&mut *tx).await?;
        tx.commit().await?;
        removed.map(User::try_from).transpose()
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("UPDATE users SET role = $2 WHERE id = $1 RETURNING *")
            .bind(id).bind(role.as_str()).fetch_optional(&self.pool).await?
            .map(User::try_from).transpose()
    }

    async fn set_pending_total(&self, id: UserId, total: Money) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("UPDATE users SET pending_total = $2 WHERE id = $1 RETURNING *")
            .bind(id).bind(total.amount()).fetch_optional(&self.pool).await?
            .map(User::try_from).transpose()
    }
}
