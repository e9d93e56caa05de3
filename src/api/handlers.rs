use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ApiResult;
use crate::domain::aggregates::{Cart, DeletedProduct, Order, OrderStatus, Product, Refund, Role, User};
use crate::domain::value_objects::{Money, TransactionNumber};
use crate::services::{
    CartView, Identity, NewProduct, OrderLineRequest, OrderSource, PlaceOrder, ProductUpdate, RefundView,
    RegisterUser, Services, SubmitRefund, UpdateUser,
};
use crate::StoreError;

// =============================================================================
// Paging
// =============================================================================

#[derive(Debug, Deserialize)] pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32>, pub category: Option<String> }
#[derive(Debug, Serialize)] pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: i64, pub page: u32 }

impl ListParams {
    /// Cut one page out of an ordered result. Pages start at 1 and hold at
    /// most 100 items.
    fn paginate<T>(&self, items: Vec<T>) -> PaginatedResponse<T> {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100) as usize;
        let total = items.len() as i64;
        let skip = (page as usize - 1).saturating_mul(per_page);
        PaginatedResponse { data: items.into_iter().skip(skip).take(per_page).collect(), total, page }
    }
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Deserialize)] pub struct RestockRequest { pub delta: i64 }
#[derive(Debug, Deserialize)] pub struct DeleteProductsRequest { pub ids: Vec<Uuid>, pub reason: String }

pub async fn list_products(State(s): State<Services>, _: Identity, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<Product>>> {
    Ok(Json(p.paginate(s.catalog.list_products(p.category.as_deref()).await?)))
}

pub async fn create_product(State(s): State<Services>, id: Identity, Json(r): Json<NewProduct>) -> ApiResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_product(&id, r).await?)))
}

pub async fn get_product(State(s): State<Services>, _: Identity, Path(pid): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.catalog.get_product(pid).await?))
}

pub async fn update_product(State(s): State<Services>, id: Identity, Path(pid): Path<Uuid>, Json(r): Json<ProductUpdate>) -> ApiResult<Json<Product>> {
    Ok(Json(s.catalog.update_product(&id, pid, r).await?))
}

pub async fn restock(State(s): State<Services>, id: Identity, Path(pid): Path<Uuid>, Json(r): Json<RestockRequest>) -> ApiResult<Json<Product>> {
    Ok(Json(s.catalog.restock(&id, pid, r.delta).await?))
}

pub async fn delete_products(State(s): State<Services>, id: Identity, Json(r): Json<DeleteProductsRequest>) -> ApiResult<Json<Vec<DeletedProduct>>> {
    Ok(Json(s.catalog.delete_products(&id, &r.ids, &r.reason).await?))
}

pub async fn list_deleted_products(State(s): State<Services>, id: Identity, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<DeletedProduct>>> {
    Ok(Json(p.paginate(s.catalog.list_deleted_products(&id).await?)))
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Deserialize)] pub struct SetRoleRequest { pub role: Role }

/// Called by the identity collaborator when an account is created, before
/// the user holds an identity of their own.
pub async fn register_user(State(s): State<Services>, Json(r): Json<RegisterUser>) -> ApiResult<(StatusCode, Json<User>)> {
    Ok((StatusCode::CREATED, Json(s.users.register(r).await?)))
}

pub async fn list_users(State(s): State<Services>, id: Identity, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<User>>> {
    Ok(Json(p.paginate(s.users.list_users(&id).await?)))
}

pub async fn get_user(State(s): State<Services>, id: Identity, Path(uid): Path<Uuid>) -> ApiResult<Json<User>> {
    Ok(Json(s.users.get_user(&id, uid).await?))
}

pub async fn update_user(State(s): State<Services>, id: Identity, Path(uid): Path<Uuid>, Json(r): Json<UpdateUser>) -> ApiResult<Json<User>> {
    Ok(Json(s.users.update_user(&id, uid, r).await?))
}

pub async fn delete_user(State(s): State<Services>, id: Identity, Path(uid): Path<Uuid>) -> ApiResult<StatusCode> {
    s.users.delete_user(&id, uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_role(State(s): State<Services>, id: Identity, Path(uid): Path<Uuid>, Json(r): Json<SetRoleRequest>) -> ApiResult<Json<User>> {
    Ok(Json(s.users.set_role(&id, uid, r.role).await?))
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Deserialize)] pub struct AddToCartRequest { pub product_id: Uuid, pub quantity: u32 }
#[derive(Debug, Deserialize)] pub struct UpdateLineRequest { pub quantity: u32 }
#[derive(Debug, Serialize)] pub struct QuoteResponse { pub pending_total: Money }

pub async fn view_cart(State(s): State<Services>, id: Identity) -> ApiResult<Json<CartView>> {
    Ok(Json(s.carts.view_cart(&id, id.user_id).await?))
}

pub async fn add_to_cart(State(s): State<Services>, id: Identity, Json(r): Json<AddToCartRequest>) -> ApiResult<Json<Cart>> {
    Ok(Json(s.carts.add_to_cart(&id, id.user_id, r.product_id, r.quantity).await?))
}

pub async fn update_cart_line(State(s): State<Services>, id: Identity, Path(line_id): Path<Uuid>, Json(r): Json<UpdateLineRequest>) -> ApiResult<Json<Cart>> {
    Ok(Json(s.carts.update_cart_line_quantity(&id, id.user_id, line_id, r.quantity).await?))
}

pub async fn remove_cart_line(State(s): State<Services>, id: Identity, Path(line_id): Path<Uuid>) -> ApiResult<Json<Cart>> {
    Ok(Json(s.carts.remove_cart_line(&id, id.user_id, line_id).await?))
}

pub async fn reset_cart(State(s): State<Services>, id: Identity) -> ApiResult<StatusCode> {
    s.carts.reset_cart(&id, id.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn quote(State(s): State<Services>, id: Identity) -> ApiResult<Json<QuoteResponse>> {
    Ok(Json(QuoteResponse { pending_total: s.checkout.quote(&id, id.user_id).await? }))
}

// =============================================================================
// Orders
// =============================================================================

/// `items` absent means "check out the cart".
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Option<Vec<OrderLineRequest>>,
    pub payment_method: String,
    #[serde(default)]
    pub initial_status: OrderStatus,
}

#[derive(Debug, Deserialize)] pub struct UpdateStatusRequest { pub status: OrderStatus }
#[derive(Debug, Deserialize)] pub struct RemoveLinesRequest { pub product_ids: Vec<Uuid> }

pub async fn place_order(State(s): State<Services>, id: Identity, Json(r): Json<PlaceOrderRequest>) -> ApiResult<(StatusCode, Json<Order>)> {
    let source = match r.items {
        Some(items) => OrderSource::Lines(items.into_iter().map(|l| (l.product_id, l.quantity)).collect()),
        None => OrderSource::Cart,
    };
    let req = PlaceOrder { source, payment_method: r.payment_method, initial_status: r.initial_status };
    Ok((StatusCode::CREATED, Json(s.checkout.place_order(&id, id.user_id, req).await?)))
}

pub async fn list_orders(State(s): State<Services>, id: Identity, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<Order>>> {
    Ok(Json(p.paginate(s.checkout.list_orders(&id).await?)))
}

pub async fn list_all_orders(State(s): State<Services>, id: Identity, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<Order>>> {
    Ok(Json(p.paginate(s.checkout.list_all_orders(&id).await?)))
}

pub async fn get_order(State(s): State<Services>, id: Identity, Path(oid): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.checkout.get_order(&id, oid).await?))
}

pub async fn get_order_by_transaction(State(s): State<Services>, id: Identity, Path(txn): Path<String>) -> ApiResult<Json<Order>> {
    let txn = TransactionNumber::parse(txn).map_err(|e| StoreError::Validation(e.to_string()))?;
    Ok(Json(s.checkout.find_by_transaction(&id, &txn).await?))
}

pub async fn update_order_status(State(s): State<Services>, id: Identity, Path(oid): Path<Uuid>, Json(r): Json<UpdateStatusRequest>) -> ApiResult<Json<Order>> {
    Ok(Json(s.checkout.update_order_status(&id, oid, r.status).await?))
}

pub async fn remove_order_lines(State(s): State<Services>, id: Identity, Path(oid): Path<Uuid>, Json(r): Json<RemoveLinesRequest>) -> ApiResult<Json<Order>> {
    Ok(Json(s.checkout.remove_order_lines(&id, oid, &r.product_ids).await?))
}

// =============================================================================
// Refunds
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitRefundRequest {
    pub transaction_number: String,
    pub reason: String,
    pub date_cancelled: Option<DateTime<Utc>>,
}

pub async fn list_refunds(State(s): State<Services>, id: Identity, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<RefundView>>> {
    Ok(Json(p.paginate(s.refunds.view_refunds(&id).await?)))
}

pub async fn submit_refund(State(s): State<Services>, id: Identity, Json(r): Json<SubmitRefundRequest>) -> ApiResult<(StatusCode, Json<Refund>)> {
    let transaction_number = TransactionNumber::parse(r.transaction_number).map_err(|e| StoreError::Validation(e.to_string()))?;
    let req = SubmitRefund { transaction_number, reason: r.reason, date_cancelled: r.date_cancelled };
    Ok((StatusCode::CREATED, Json(s.refunds.submit_refund(&id, req).await?)))
}

pub async fn approve_refund(State(s): State<Services>, id: Identity, Path(rid): Path<Uuid>) -> ApiResult<Json<Refund>> {
    Ok(Json(s.refunds.approve_refund(&id, rid).await?))
}

pub async fn decline_refund(State(s): State<Services>, id: Identity, Path(rid): Path<Uuid>) -> ApiResult<Json<Refund>> {
    Ok(Json(s.refunds.decline_refund(&id, rid).await?))
}
