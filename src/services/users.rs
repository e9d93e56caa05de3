//! User registration, profile maintenance and role management.

use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::access::Identity;
use crate::domain::aggregates::{ProfileChanges, Role, User};
use crate::repository::{Store, UserRepository};
use crate::{Result, StoreError, UserId};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterUser {
    #[validate(range(min = 1))]
    pub id_number: u64,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 32))]
    pub phone_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Partial profile edit. Omitted fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(max = 64))]
    pub first_name: Option<String>,
    #[validate(length(max = 64))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 32))]
    pub phone_number: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Create a user. The starting role follows [`Role::default_for_id_number`].
    pub async fn register(&self, req: RegisterUser) -> Result<User> {
        req.validate()?;
        let user = User::register(req.id_number, req.email, req.phone_number)
            .map_err(|e| StoreError::Validation(e.to_string()))?
            .with_name(req.first_name, req.last_name);
        self.store.insert_user(&user).await?;
        info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    pub async fn get_user(&self, identity: &Identity, id: UserId) -> Result<User> {
        identity.require_owner_or_privileged(id, "view user")?;
        self.store.get_user(id).await?.ok_or(StoreError::UserNotFound(id))
    }

    pub async fn list_users(&self, identity: &Identity) -> Result<Vec<User>> {
        identity.require_privileged("list users")?;
        self.store.list_users().await
    }

    pub async fn update_user(&self, identity: &Identity, id: UserId, req: UpdateUser) -> Result<User> {
        identity.require_owner_or_admin(id, "update user")?;
        req.validate()?;
        let mut user = self.store.get_user(id).await?.ok_or(StoreError::UserNotFound(id))?;
        user.update_profile(ProfileChanges {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            phone_number: req.phone_number,
        })
        .map_err(|e| StoreError::Validation(e.to_string()))?;
        let user = self.store.update_user(&user).await?.ok_or(StoreError::UserNotFound(id))?;
        info!(user_id = %id, changed_by = %identity.user_id, "user updated");
        Ok(user)
    }

    /// Remove a user together with their cart. Orders and refunds stay.
    pub async fn delete_user(&self, identity: &Identity, id: UserId) -> Result<User> {
        identity.require_admin("delete user")?;
        let user = self.store.delete_user(id).await?.ok_or(StoreError::UserNotFound(id))?;
        info!(user_id = %id, deleted_by = %identity.user_id, "user deleted");
        Ok(user)
    }

    pub async fn set_role(&self, identity: &Identity, id: UserId, role: Role) -> Result<User> {
        identity.require_admin("set role")?;
        let user = self.store.set_role(id, role).await?.ok_or(StoreError::UserNotFound(id))?;
        info!(user_id = %id, %role, changed_by = %identity.user_id, "role changed");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Quantity;
    use crate::repository::{CartRepository, MemoryStore};
    use uuid::Uuid;

    fn request(id_number: u64, email: &str) -> RegisterUser {
        RegisterUser {
            id_number,
            email: email.into(),
            phone_number: "555-0101".into(),
            first_name: Some("Ada".into()),
            last_name: None,
        }
    }

    #[tokio::test]
    async fn role_defaults_from_id_number() {
        let svc = UserService::new(Arc::new(MemoryStore::new()));
        assert_eq!(svc.register(request(2_021_001, "s@campus.edu")).await.unwrap().role, Role::Student);
        assert_eq!(svc.register(request(10_000_001, "t@campus.edu")).await.unwrap().role, Role::Staff);
        assert_eq!(svc.register(request(42, "o@campus.edu")).await.unwrap().role, Role::Student);
    }

    #[tokio::test]
    async fn register_rejects_bad_and_duplicate_input() {
        let svc = UserService::new(Arc::new(MemoryStore::new()));
        assert!(matches!(svc.register(request(2_021_001, "not-an-email")).await, Err(StoreError::Validation(_))));
        svc.register(request(2_021_001, "s@campus.edu")).await.unwrap();
        assert!(matches!(svc.register(request(2_021_001, "x@campus.edu")).await, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn only_admins_set_roles() {
        let svc = UserService::new(Arc::new(MemoryStore::new()));
        let user = svc.register(request(2_021_001, "s@campus.edu")).await.unwrap();
        let staff = Identity::new(Uuid::now_v7(), Role::Staff);
        assert!(matches!(svc.set_role(&staff, user.id, Role::Employee).await, Err(StoreError::Unauthorized(_))));
        let admin = Identity::new(Uuid::now_v7(), Role::Admin);
        assert_eq!(svc.set_role(&admin, user.id, Role::Employee).await.unwrap().role, Role::Employee);
        assert!(matches!(svc.set_role(&admin, Uuid::now_v7(), Role::Staff).await, Err(StoreError::UserNotFound(_))));
        let me = Identity::new(user.id, Role::Employee);
        assert_eq!(svc.get_user(&me, user.id).await.unwrap().first_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn listing_users_needs_privilege() {
        let svc = UserService::new(Arc::new(MemoryStore::new()));
        let user = svc.register(request(2_021_001, "s@campus.edu")).await.unwrap();
        svc.register(request(2_021_002, "t@campus.edu")).await.unwrap();
        let me = Identity::new(user.id, Role::Student);
        assert!(matches!(svc.list_users(&me).await, Err(StoreError::Unauthorized(_))));
        let staff = Identity::new(Uuid::now_v7(), Role::Staff);
        assert_eq!(svc.list_users(&staff).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn owner_updates_own_profile() {
        let svc = UserService::new(Arc::new(MemoryStore::new()));
        let user = svc.register(request(2_021_001, "s@campus.edu")).await.unwrap();
        let other = svc.register(request(2_021_002, "t@campus.edu")).await.unwrap();
        let me = Identity::new(user.id, Role::Student);

        let edit = UpdateUser { last_name: Some("Lovelace".into()), phone_number: Some("555-0199".into()), ..Default::default() };
        let updated = svc.update_user(&me, user.id, edit).await.unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Ada"));
        assert_eq!(updated.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(updated.phone_number, "555-0199");
        assert_eq!(updated.role, Role::Student);

        let bad = UpdateUser { email: Some("nope".into()), ..Default::default() };
        assert!(matches!(svc.update_user(&me, user.id, bad).await, Err(StoreError::Validation(_))));
        let taken = UpdateUser { email: Some("t@campus.edu".into()), ..Default::default() };
        assert!(matches!(svc.update_user(&me, user.id, taken).await, Err(StoreError::Validation(_))));
        assert!(matches!(svc.update_user(&me, other.id, UpdateUser::default()).await, Err(StoreError::Unauthorized(_))));

        let admin = Identity::new(Uuid::now_v7(), Role::Admin);
        let edit = UpdateUser { email: Some("T.New@campus.edu".into()), ..Default::default() };
        assert_eq!(svc.update_user(&admin, other.id, edit).await.unwrap().email, "t.new@campus.edu");
    }

    #[tokio::test]
    async fn only_admins_delete_users_and_carts_go_with_them() {
        let store = Arc::new(MemoryStore::new());
        let svc = UserService::new(store.clone());
        let user = svc.register(request(2_021_001, "s@campus.edu")).await.unwrap();
        store.merge_line(user.id, Uuid::now_v7(), Quantity::new(2).unwrap()).await.unwrap();

        let staff = Identity::new(Uuid::now_v7(), Role::Staff);
        assert!(matches!(svc.delete_user(&staff, user.id).await, Err(StoreError::Unauthorized(_))));
        let admin = Identity::new(Uuid::now_v7(), Role::Admin);
        assert_eq!(svc.delete_user(&admin, user.id).await.unwrap().id, user.id);
        assert!(store.get_cart(user.id).await.unwrap().is_empty());
        assert!(matches!(svc.delete_user(&admin, user.id).await, Err(StoreError::UserNotFound(_))));
        assert!(matches!(svc.get_user(&admin, user.id).await, Err(StoreError::UserNotFound(_))));
    }
}
