//! Refund Aggregate
//!
//! A refund never carries its own copy of the purchased items. Items are
//! resolved from the order by transaction number when the refund is decided.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::TransactionNumber;
use crate::{RefundId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub transaction_number: TransactionNumber,
    pub date_cancelled: DateTime<Utc>,
    pub reason: String,
    pub submitted_by: UserId,
    pub approval: Approval,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    #[default]
    Pending,
    Approved,
    Declined,
}

impl Approval {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Declined => "declined" }
    }
}

impl fmt::Display for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Approval {
    type Err = RefundError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "declined" => Ok(Self::Declined),
            other => Err(RefundError::UnknownApproval(other.to_string())),
        }
    }
}

impl Refund {
    pub fn submit(
        transaction_number: TransactionNumber,
        reason: impl Into<String>,
        date_cancelled: DateTime<Utc>,
        submitted_by: UserId,
    ) -> Result<Self, RefundError> {
        let reason = reason.into().trim().to_string();
        if reason.is_empty() { return Err(RefundError::MissingReason); }
        Ok(Self { id: Uuid::now_v7(), transaction_number, date_cancelled, reason, submitted_by, approval: Approval::Pending })
    }

    pub fn is_pending(&self) -> bool { self.approval == Approval::Pending }

    /// Record a decision. Only a pending refund can be decided.
    pub fn decide(&mut self, decision: Approval) -> Result<(), RefundError> {
        if !self.is_pending() || decision == Approval::Pending { return Err(RefundError::AlreadyDecided); }
        self.approval = decision;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum RefundError { MissingReason, AlreadyDecided, UnknownApproval(String) }
impl std::error::Error for RefundError {}
impl fmt::Display for RefundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReason => write!(f, "Missing reason"),
            Self::AlreadyDecided => write!(f, "Refund already decided"),
            Self::UnknownApproval(s) => write!(f, "Unknown approval state '{s}'"),
        }
    }
}
