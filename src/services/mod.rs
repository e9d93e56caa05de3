//! Application services.

pub mod access;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod publisher;
pub mod refund;
pub mod users;

use std::sync::Arc;

use crate::repository::Store;

pub use access::Identity;
pub use cart::{CartLineView, CartService, CartView};
pub use catalog::{CatalogService, NewProduct, ProductUpdate};
pub use checkout::{CheckoutService, OrderLineRequest, OrderSource, PlaceOrder};
pub use publisher::EventPublisher;
pub use refund::{RefundService, RefundView, SubmitRefund};
pub use users::{RegisterUser, UpdateUser, UserService};

/// Every service wired against one store.
#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub refunds: RefundService,
    pub users: UserService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, publisher: EventPublisher) -> Self {
        let catalog = CatalogService::new(store.clone(), publisher.clone());
        let carts = CartService::new(store.clone());
        let checkout = CheckoutService::new(store.clone(), catalog.clone(), carts.clone(), publisher.clone());
        let refunds = RefundService::new(store.clone(), catalog.clone(), publisher);
        let users = UserService::new(store);
        Self { catalog, carts, checkout, refunds, users }
    }
}
