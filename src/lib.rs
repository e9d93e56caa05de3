//! Campus Store
//!
//! Ordering backend for a campus store.
//!
//! ## Features
//! - Product catalog with atomic stock adjustment
//! - Per-user cart with merge-on-add
//! - Stock-aware checkout with compensating rollback
//! - Order status state machine
//! - Refunds that restore inventory exactly once

pub mod api;
pub mod config;
pub mod domain;
pub mod repository;
pub mod services;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::TransactionNumber;

// =============================================================================
// Identifiers
// =============================================================================

pub type ProductId = Uuid;
pub type UserId = Uuid;
pub type OrderId = Uuid;
pub type RefundId = Uuid;
pub type LineId = Uuid;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("refund {0} not found")]
    RefundNotFound(RefundId),

    #[error("cart line {0} not found")]
    LineNotFound(LineId),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("invalid order status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("refund {0} has already been decided")]
    AlreadyDecided(RefundId),

    #[error("a refund already exists for transaction {0}")]
    RefundExists(TransactionNumber),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Coarse error categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InsufficientStock,
    InvalidTransition,
    AlreadyDecided,
    Conflict,
    Unauthorized,
    Validation,
    Storage,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProductNotFound(_)
            | Self::OrderNotFound(_)
            | Self::RefundNotFound(_)
            | Self::LineNotFound(_)
            | Self::UserNotFound(_) => ErrorKind::NotFound,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::AlreadyDecided(_) => ErrorKind::AlreadyDecided,
            Self::RefundExists(_) => ErrorKind::Conflict,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
