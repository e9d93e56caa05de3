//! Order Aggregate
//!
//! Orders freeze the unit price of every line at purchase time. The total is
//! always the sum of those frozen line totals, never a live catalog lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity, TransactionNumber};
use crate::{OrderId, ProductId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub transaction_number: TransactionNumber,
    pub created_at: DateTime<Utc>,
    pub total_price: Money,
    pub payment_method: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub label: String,
    pub unit_price: Money,
    pub quantity: Quantity,
}

impl OrderLine {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    PendingUserConfirmation,
    Paid,
    WaitingForPickup,
    Complete,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        Self::PendingUserConfirmation, Self::Paid, Self::WaitingForPickup, Self::Complete, Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingUserConfirmation => "PendingUserConfirmation",
            Self::Paid => "Paid",
            Self::WaitingForPickup => "WaitingForPickup",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_initial(&self) -> bool { matches!(self, Self::PendingUserConfirmation | Self::Paid) }
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Complete | Self::Cancelled) }

    /// Forward transitions reachable through a status update. `Cancelled` is
    /// never one of them; refund approval goes through [`Order::cancel`].
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::PendingUserConfirmation, Self::Paid)
                | (Self::Paid, Self::WaitingForPickup)
                | (Self::WaitingForPickup, Self::Complete)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

impl Order {
    pub fn place(
        user_id: UserId,
        transaction_number: TransactionNumber,
        payment_method: impl Into<String>,
        initial: OrderStatus,
        lines: Vec<OrderLine>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        if !initial.is_initial() { return Err(OrderError::InvalidInitialStatus(initial)); }
        let payment_method = payment_method.into().trim().to_string();
        if payment_method.is_empty() { return Err(OrderError::MissingPaymentMethod); }
        let total_price = lines.iter().map(OrderLine::line_total).sum();
        Ok(Self {
            id: Uuid::now_v7(), user_id, transaction_number, created_at: Utc::now(),
            total_price, payment_method, status: initial, lines,
        })
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool { self.user_id == user_id }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Cancelled });
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    /// Drop every line for the given products and recompute the total from
    /// the remaining frozen prices. Returns the number of lines removed.
    pub fn remove_lines(&mut self, product_ids: &[ProductId]) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| !product_ids.contains(&l.product_id));
        self.recalculate();
        before - self.lines.len()
    }

    fn recalculate(&mut self) {
        self.total_price = self.lines.iter().map(OrderLine::line_total).sum();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    NoItems,
    MissingPaymentMethod,
    InvalidInitialStatus(OrderStatus),
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    UnknownStatus(String),
}
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::MissingPaymentMethod => write!(f, "Missing payment method"),
            Self::InvalidInitialStatus(s) => write!(f, "{s} is not a valid initial status"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
            Self::UnknownStatus(s) => write!(f, "Unknown order status '{s}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line(cents: i64, qty: u32) -> OrderLine {
        OrderLine {
            product_id: Uuid::now_v7(),
            label: "Widget".into(),
            unit_price: Money::new(Decimal::new(cents, 2)).unwrap(),
            quantity: Quantity::new(qty).unwrap(),
        }
    }

    fn order(lines: Vec<OrderLine>) -> Order {
        Order::place(Uuid::now_v7(), TransactionNumber::from_sequence(1), "cash", OrderStatus::PendingUserConfirmation, lines).unwrap()
    }

    #[test]
    fn test_order_total_uses_frozen_prices() {
        let o = order(vec![line(1000, 2), line(250, 4)]);
        assert_eq!(o.total_price.amount(), Decimal::new(3000, 2));
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order(vec![line(1000, 1)]);
        o.transition_to(OrderStatus::Paid).unwrap();
        o.transition_to(OrderStatus::WaitingForPickup).unwrap();
        o.transition_to(OrderStatus::Complete).unwrap();
        assert!(o.status.is_terminal());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut o = order(vec![line(1000, 1)]);
        assert_eq!(
            o.transition_to(OrderStatus::Complete),
            Err(OrderError::InvalidTransition { from: OrderStatus::PendingUserConfirmation, to: OrderStatus::Complete })
        );
        assert!(o.transition_to(OrderStatus::Cancelled).is_err());
        assert_eq!(o.status, OrderStatus::PendingUserConfirmation);
    }

    #[test]
    fn test_cancel_only_from_non_terminal() {
        let mut o = order(vec![line(1000, 1)]);
        o.cancel().unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert!(o.cancel().is_err());
    }

    #[test]
    fn test_place_rejects_bad_input() {
        let user = Uuid::now_v7();
        let txn = TransactionNumber::from_sequence(9);
        assert_eq!(Order::place(user, txn.clone(), "cash", OrderStatus::Paid, vec![]).unwrap_err(), OrderError::NoItems);
        assert_eq!(
            Order::place(user, txn.clone(), "cash", OrderStatus::Complete, vec![line(1, 1)]).unwrap_err(),
            OrderError::InvalidInitialStatus(OrderStatus::Complete)
        );
        assert_eq!(Order::place(user, txn, "  ", OrderStatus::Paid, vec![line(1, 1)]).unwrap_err(), OrderError::MissingPaymentMethod);
    }

    #[test]
    fn test_remove_lines_recalculates() {
        let keep = line(1000, 1);
        let dropped = line(500, 2);
        let mut o = order(vec![keep.clone(), dropped.clone()]);
        assert_eq!(o.remove_lines(&[dropped.product_id]), 1);
        assert_eq!(o.lines, vec![keep]);
        assert_eq!(o.total_price.amount(), Decimal::new(1000, 2));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("Shipped".parse::<OrderStatus>().is_err());
    }
}
