//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod refund;
pub mod user;

pub use product::{DeletedProduct, Product, ProductError};
pub use order::{Order, OrderError, OrderLine, OrderStatus};
pub use cart::{Cart, CartError, CartLine};
pub use refund::{Approval, Refund, RefundError};
pub use user::{ProfileChanges, Role, User, UserError};
