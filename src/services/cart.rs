//! Cart engine.
//!
//! Stock checks here are optimistic: they read current catalog stock but
//! reserve nothing. Stock only moves at checkout.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::access::Identity;
use crate::domain::aggregates::{Cart, Product};
use crate::domain::value_objects::{Money, Quantity, QuantityError};
use crate::repository::{CartRepository, CatalogRepository, Store};
use crate::{LineId, ProductId, Result, StoreError, UserId};

/// A cart line joined with the product as it is in the catalog right now.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub line_id: LineId,
    pub quantity: Quantity,
    pub product: Product,
    pub line_total: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub user_id: UserId,
    pub lines: Vec<CartLineView>,
    pub total: Money,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    async fn product(&self, id: ProductId) -> Result<Product> {
        self.store.get_product(id).await?.ok_or(StoreError::ProductNotFound(id))
    }

    fn check_stock(product: &Product, quantity: Quantity) -> Result<()> {
        let requested = quantity.as_increment();
        if product.stock < requested {
            return Err(StoreError::InsufficientStock { product_id: product.id, available: product.stock, requested });
        }
        Ok(())
    }

    /// Add `quantity` of a product, merging into an existing line.
    pub async fn add_to_cart(&self, identity: &Identity, user_id: UserId, product_id: ProductId, quantity: u32) -> Result<Cart> {
        identity.require_owner_or_privileged(user_id, "edit cart")?;
        let quantity = Quantity::new(quantity).map_err(|e| StoreError::Validation(e.to_string()))?;
        let product = self.product(product_id).await?;
        Self::check_stock(&product, quantity)?;
        let cart = self.store.merge_line(user_id, product_id, quantity).await?;
        info!(%user_id, %product_id, quantity = quantity.value(), "added to cart");
        Ok(cart)
    }

    /// Set a line to an absolute quantity. Zero removes the line.
    pub async fn update_cart_line_quantity(&self, identity: &Identity, user_id: UserId, line_id: LineId, quantity: u32) -> Result<Cart> {
        identity.require_owner_or_privileged(user_id, "edit cart")?;
        let cart = self.store.get_cart(user_id).await?;
        let line = cart.line(line_id).ok_or(StoreError::LineNotFound(line_id))?;
        match Quantity::new(quantity) {
            Ok(qty) => Self::check_stock(&self.product(line.product_id).await?, qty)?,
            Err(QuantityError::Zero) => {}
            Err(e) => return Err(StoreError::Validation(e.to_string())),
        }
        let cart = self.store.set_line_quantity(user_id, line_id, quantity).await?;
        debug!(%user_id, %line_id, quantity, "cart line updated");
        Ok(cart)
    }

    /// Removing a line that is not there is not an error.
    pub async fn remove_cart_line(&self, identity: &Identity, user_id: UserId, line_id: LineId) -> Result<Cart> {
        identity.require_owner_or_privileged(user_id, "edit cart")?;
        self.store.remove_line(user_id, line_id).await
    }

    /// The cart with every line resolved against the live catalog. Lines
    /// whose product has disappeared are left out.
    pub async fn view_cart(&self, identity: &Identity, user_id: UserId) -> Result<CartView> {
        identity.require_owner_or_privileged(user_id, "view cart")?;
        let cart = self.store.get_cart(user_id).await?;
        let mut lines = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let Some(product) = self.store.get_product(line.product_id).await? else {
                debug!(%user_id, product_id = %line.product_id, "cart line references a missing product");
                continue;
            };
            let line_total = product.price.multiply(line.quantity);
            lines.push(CartLineView { line_id: line.id, quantity: line.quantity, product, line_total });
        }
        let total = lines.iter().map(|l| l.line_total).sum();
        Ok(CartView { user_id, lines, total })
    }

    pub async fn reset_cart(&self, identity: &Identity, user_id: UserId) -> Result<()> {
        identity.require_owner_or_privileged(user_id, "reset cart")?;
        self.store.clear_cart(user_id).await?;
        info!(%user_id, "cart reset");
        Ok(())
    }
}
