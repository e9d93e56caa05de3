//! Catalog store.
//!
//! [`CatalogService::adjust_stock`] is the only path through which stock
//! changes once a product exists. Checkout, refunds and manual restocks all
//! go through it.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use super::access::Identity;
use super::publisher::EventPublisher;
use crate::domain::aggregates::{DeletedProduct, Product, ProductError};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::Money;
use crate::repository::{CartRepository, CatalogRepository, Store};
use crate::{ProductId, Result, StoreError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub label: String,
    pub price: Money,
    #[validate(range(min = 0))]
    pub stock: i64,
    pub category: Option<String>,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductUpdate {
    #[validate(length(min = 1, max = 200))]
    pub label: Option<String>,
    pub price: Option<Money>,
    pub category: Option<String>,
    pub photo: Option<String>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    publisher: EventPublisher,
}

fn product_error(e: ProductError) -> StoreError {
    StoreError::Validation(e.to_string())
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, publisher: EventPublisher) -> Self { Self { store, publisher } }

    pub async fn create_product(&self, identity: &Identity, req: NewProduct) -> Result<Product> {
        identity.require_privileged("create product")?;
        req.validate()?;
        let mut product = Product::create(req.label, req.price, req.stock).map_err(product_error)?;
        product.category = req.category;
        product.photo = req.photo;
        self.store.insert_product(&product).await?;
        info!(product_id = %product.id, label = %product.label, stock = product.stock, "product created");
        self.publisher
            .publish([DomainEvent::Product(ProductEvent::Created { product_id: product.id, stock: product.stock })])
            .await;
        Ok(product)
    }

    pub async fn update_product(&self, identity: &Identity, id: ProductId, req: ProductUpdate) -> Result<Product> {
        identity.require_privileged("update product")?;
        req.validate()?;
        let mut product = self.get_product(id).await?;
        if let Some(label) = req.label { product.rename(label).map_err(product_error)?; }
        if let Some(price) = req.price { product.update_price(price); }
        if req.category.is_some() { product.update_category(req.category); }
        if req.photo.is_some() { product.update_photo(req.photo); }
        let updated = self.store.update_product_details(&product).await?.ok_or(StoreError::ProductNotFound(id))?;
        info!(product_id = %id, "product updated");
        Ok(updated)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store.get_product(id).await?.ok_or(StoreError::ProductNotFound(id))
    }

    pub async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> {
        self.store.list_products(category).await
    }

    /// Apply a signed stock delta atomically.
    pub async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product> {
        match self.store.adjust_stock(id, delta).await {
            Ok(product) => {
                info!(product_id = %id, delta, stock = product.stock, "stock adjusted");
                self.publisher
                    .publish([DomainEvent::Product(ProductEvent::StockAdjusted { product_id: id, delta, stock: product.stock })])
                    .await;
                Ok(product)
            }
            Err(e) => {
                warn!(product_id = %id, delta, reason = %e, "stock adjustment rejected");
                Err(e)
            }
        }
    }

    /// Administrative stock correction.
    pub async fn restock(&self, identity: &Identity, id: ProductId, delta: i64) -> Result<Product> {
        identity.require_privileged("restock product")?;
        if delta == 0 { return Err(StoreError::Validation("stock delta must not be zero".into())); }
        self.adjust_stock(id, delta).await
    }

    /// Remove products from the catalog and from every cart. Unknown ids are
    /// skipped.
    pub async fn delete_products(&self, identity: &Identity, ids: &[ProductId], reason: &str) -> Result<Vec<DeletedProduct>> {
        identity.require_privileged("delete products")?;
        let reason = reason.trim();
        if reason.is_empty() { return Err(StoreError::Validation("a deletion reason is required".into())); }
        if ids.is_empty() { return Err(StoreError::Validation("no products given".into())); }

        let mut deleted = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(record) = self.store.delete_product(id, reason).await? else {
                warn!(product_id = %id, "delete skipped, product not found");
                continue;
            };
            let purged = self.store.purge_product(id).await?;
            info!(product_id = %id, purged_cart_lines = purged, "product deleted");
            self.publisher
                .publish([DomainEvent::Product(ProductEvent::Deleted { product_id: id, reason: reason.to_string() })])
                .await;
            deleted.push(record);
        }
        Ok(deleted)
    }

    pub async fn list_deleted_products(&self, identity: &Identity) -> Result<Vec<DeletedProduct>> {
        identity.require_privileged("list deleted products")?;
        self.store.list_deleted_products().await
    }
}
