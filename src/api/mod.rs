//! HTTP surface.

pub mod error;
pub mod handlers;
pub mod identity;

use axum::routing::{delete, get, post, put};
use axum::{Json, Router};

use crate::services::Services;
use handlers::*;

pub fn router(services: Services) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "campus-store"})) }))
        .route("/api/v1/products", get(list_products).post(create_product).delete(delete_products))
        .route("/api/v1/products/deleted", get(list_deleted_products))
        .route("/api/v1/products/:id", get(get_product).put(update_product))
        .route("/api/v1/products/:id/stock", post(restock))
        .route("/api/v1/users", get(list_users).post(register_user))
        .route("/api/v1/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/api/v1/users/:id/role", put(set_role))
        .route("/api/v1/cart", get(view_cart).post(add_to_cart))
        .route("/api/v1/cart/reset", post(reset_cart))
        .route("/api/v1/cart/quote", post(quote))
        .route("/api/v1/cart/:line_id", put(update_cart_line).delete(remove_cart_line))
        .route("/api/v1/orders", get(list_orders).post(place_order))
        .route("/api/v1/orders/all", get(list_all_orders))
        .route("/api/v1/orders/transaction/:txn", get(get_order_by_transaction))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/orders/:id/lines", delete(remove_order_lines))
        .route("/api/v1/refunds", get(list_refunds).post(submit_refund))
        .route("/api/v1/refunds/:id/approve", put(approve_refund))
        .route("/api/v1/refunds/:id/decline", put(decline_refund))
        .with_state(services)
}
