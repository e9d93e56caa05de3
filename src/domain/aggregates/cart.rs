//! Cart Aggregate
//!
//! A cart holds at most one line per product. Adding a product that is
//! already present grows the existing line instead of appending a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Quantity, QuantityError};
use crate::{LineId, ProductId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: LineId,
    pub product_id: ProductId,
    pub quantity: Quantity,
}

impl Cart {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, lines: vec![], updated_at: Utc::now() }
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, line_id: LineId) -> Option<&CartLine> { self.lines.iter().find(|l| l.id == line_id) }

    /// Merge `quantity` into the line for `product_id`, creating it if absent.
    /// Returns the id of the affected line.
    pub fn add_item(&mut self, product_id: ProductId, quantity: Quantity) -> Result<LineId, CartError> {
        let id = match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(quantity).map_err(CartError::InvalidQuantity)?;
                existing.id
            }
            None => {
                let id = Uuid::now_v7();
                self.lines.push(CartLine { id, product_id, quantity });
                id
            }
        };
        self.touch();
        Ok(id)
    }

    /// Set the absolute quantity of a line. Zero removes the line.
    pub fn set_quantity(&mut self, line_id: LineId, quantity: u32) -> Result<(), CartError> {
        let pos = self.lines.iter().position(|l| l.id == line_id).ok_or(CartError::LineNotFound(line_id))?;
        match Quantity::new(quantity) {
            Ok(q) => self.lines[pos].quantity = q,
            Err(QuantityError::Zero) => { self.lines.remove(pos); }
            Err(e) => return Err(CartError::InvalidQuantity(e)),
        }
        self.touch();
        Ok(())
    }

    /// Remove a line. Returns whether anything was removed.
    pub fn remove_line(&mut self, line_id: LineId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        let removed = self.lines.len() != before;
        if removed { self.touch(); }
        removed
    }

    /// Drop every line referencing `product_id`.
    pub fn purge_product(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        let removed = self.lines.len() != before;
        if removed { self.touch(); }
        removed
    }

    pub fn clear(&mut self) { self.lines.clear(); self.touch(); }

    /// The (product, quantity) pairs to purchase, frozen at this instant.
    pub fn snapshot(&self) -> Vec<(ProductId, Quantity)> {
        self.lines.iter().map(|l| (l.product_id, l.quantity)).collect()
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { LineNotFound(LineId), InvalidQuantity(QuantityError) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LineNotFound(id) => write!(f, "Cart line {id} not found"),
            Self::InvalidQuantity(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }

    #[test]
    fn test_add_merges_by_product() {
        let mut cart = Cart::new(Uuid::now_v7());
        let p = Uuid::now_v7();
        let first = cart.add_item(p, qty(2)).unwrap();
        let second = cart.add_item(p, qty(3)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, qty(5));
    }

    #[test]
    fn test_distinct_products_get_distinct_lines() {
        let mut cart = Cart::new(Uuid::now_v7());
        cart.add_item(Uuid::now_v7(), qty(1)).unwrap();
        cart.add_item(Uuid::now_v7(), qty(1)).unwrap();
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn test_set_quantity() {
        let mut cart = Cart::new(Uuid::now_v7());
        let line = cart.add_item(Uuid::now_v7(), qty(2)).unwrap();
        cart.set_quantity(line, 7).unwrap();
        assert_eq!(cart.line(line).unwrap().quantity, qty(7));
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let mut cart = Cart::new(Uuid::now_v7());
        let line = cart.add_item(Uuid::now_v7(), qty(2)).unwrap();
        cart.set_quantity(line, 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_unknown_line() {
        let mut cart = Cart::new(Uuid::now_v7());
        let missing = Uuid::now_v7();
        assert_eq!(cart.set_quantity(missing, 1), Err(CartError::LineNotFound(missing)));
    }

    #[test]
    fn test_merge_past_max_quantity_is_rejected() {
        let mut cart = Cart::new(Uuid::now_v7());
        let p = Uuid::now_v7();
        let line = cart.add_item(p, qty(Quantity::MAX - 1)).unwrap();
        assert!(matches!(cart.add_item(p, qty(2)), Err(CartError::InvalidQuantity(QuantityError::TooLarge(_)))));
        assert_eq!(cart.line(line).unwrap().quantity, qty(Quantity::MAX - 1));
        assert!(matches!(cart.set_quantity(line, u32::MAX), Err(CartError::InvalidQuantity(_))));
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut cart = Cart::new(Uuid::now_v7());
        let line = cart.add_item(Uuid::now_v7(), qty(1)).unwrap();
        assert!(cart.remove_line(line));
        let after_first = cart.clone();
        assert!(!cart.remove_line(line));
        assert_eq!(cart, after_first);
    }

    #[test]
    fn test_snapshot_and_clear() {
        let mut cart = Cart::new(Uuid::now_v7());
        let p = Uuid::now_v7();
        cart.add_item(p, qty(4)).unwrap();
        assert_eq!(cart.snapshot(), vec![(p, qty(4))]);
        cart.clear();
        assert!(cart.snapshot().is_empty());
    }
}
