//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::ProductId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub label: String,
    pub price: Money,
    pub stock: i64,
    pub category: Option<String>,
    pub photo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Record kept for every product removed from the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeletedProduct {
    pub product_id: ProductId,
    pub label: String,
    pub reason: String,
    pub deleted_at: DateTime<Utc>,
}

impl Product {
    pub fn create(label: impl Into<String>, price: Money, stock: i64) -> Result<Self, ProductError> {
        let label = label.into().trim().to_string();
        if label.is_empty() { return Err(ProductError::MissingLabel); }
        if stock < 0 { return Err(ProductError::NegativeStock); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), label, price, stock, category: None, photo: None,
            created_at: now, updated_at: now,
        })
    }

    pub fn is_in_stock(&self) -> bool { self.stock > 0 }

    pub fn rename(&mut self, label: impl Into<String>) -> Result<(), ProductError> {
        let label = label.into().trim().to_string();
        if label.is_empty() { return Err(ProductError::MissingLabel); }
        self.label = label;
        self.touch();
        Ok(())
    }

    pub fn update_price(&mut self, price: Money) { self.price = price; self.touch(); }
    pub fn update_category(&mut self, category: Option<String>) { self.category = category; self.touch(); }
    pub fn update_photo(&mut self, photo: Option<String>) { self.photo = photo; self.touch(); }

    /// Apply a signed stock delta. The product is left untouched when the
    /// result would be negative.
    pub fn apply_stock_delta(&mut self, delta: i64) -> Result<(), ProductError> {
        let next = self.stock.checked_add(delta).ok_or(ProductError::StockOverflow)?;
        if next < 0 {
            return Err(ProductError::InsufficientStock { available: self.stock, requested: -delta });
        }
        self.stock = next;
        self.touch();
        Ok(())
    }

    pub fn into_deleted(self, reason: impl Into<String>) -> DeletedProduct {
        DeletedProduct { product_id: self.id, label: self.label, reason: reason.into(), deleted_at: Utc::now() }
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError { MissingLabel, NegativeStock, StockOverflow, InsufficientStock { available: i64, requested: i64 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingLabel => write!(f, "Missing label"),
            Self::NegativeStock => write!(f, "Stock must not be negative"),
            Self::StockOverflow => write!(f, "Stock overflow"),
            Self::InsufficientStock { available, requested } => write!(f, "Insufficient stock: available {available}, requested {requested}"),
        }
    }
}
