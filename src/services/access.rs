//! Role/access gate.
//!
//! The identity is produced upstream (token verification is not done here)
//! and handed to every operation explicitly.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::Role;
use crate::{Result, StoreError, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: UserId, role: Role) -> Self { Self { user_id, role } }

    pub fn is_privileged(&self) -> bool { self.role.is_privileged() }

    /// Staff, employee or admin.
    pub fn require_privileged(&self, action: &str) -> Result<()> {
        if self.is_privileged() { return Ok(()); }
        Err(StoreError::Unauthorized(format!("{action} requires staff, employee or admin role")))
    }

    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.role == Role::Admin { return Ok(()); }
        Err(StoreError::Unauthorized(format!("{action} requires admin role")))
    }

    pub fn require_owner_or_admin(&self, owner: UserId, action: &str) -> Result<()> {
        if self.user_id == owner { return Ok(()); }
        self.require_admin(action)
    }

    /// The caller owns the record, or holds a privileged role.
    pub fn require_owner_or_privileged(&self, owner: UserId, action: &str) -> Result<()> {
        if self.user_id == owner || self.is_privileged() { return Ok(()); }
        Err(StoreError::Unauthorized(format!("{action} is limited to the owner")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn privileged_gate() {
        let student = Identity::new(Uuid::now_v7(), Role::Student);
        assert!(matches!(student.require_privileged("approve refund"), Err(StoreError::Unauthorized(_))));
        assert!(Identity::new(Uuid::now_v7(), Role::Employee).require_privileged("approve refund").is_ok());
    }

    #[test]
    fn admin_gate() {
        assert!(Identity::new(Uuid::now_v7(), Role::Staff).require_admin("set role").is_err());
        assert!(Identity::new(Uuid::now_v7(), Role::Admin).require_admin("set role").is_ok());
    }

    #[test]
    fn owner_or_admin_gate() {
        let owner = Uuid::now_v7();
        assert!(Identity::new(owner, Role::Student).require_owner_or_admin(owner, "update user").is_ok());
        assert!(Identity::new(Uuid::now_v7(), Role::Staff).require_owner_or_admin(owner, "update user").is_err());
        assert!(Identity::new(Uuid::now_v7(), Role::Admin).require_owner_or_admin(owner, "update user").is_ok());
    }

    #[test]
    fn owner_gate() {
        let owner = Uuid::now_v7();
        assert!(Identity::new(owner, Role::Student).require_owner_or_privileged(owner, "view order").is_ok());
        assert!(Identity::new(Uuid::now_v7(), Role::Student).require_owner_or_privileged(owner, "view order").is_err());
        assert!(Identity::new(Uuid::now_v7(), Role::Staff).require_owner_or_privileged(owner, "view order").is_ok());
    }
}
