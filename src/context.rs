//! Viewer identity passed explicitly into the live lists.
//!
//! The scope a viewer may see is derived from this context. Changing it is an
//! explicit re-initialization of the list, see
//! [`LiveListController::change_context`](crate::live_list::LiveListController::change_context).

use crate::core::{Collection, Role};

/// Who is looking at a list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewerContext {
    pub user_id: Option<String>,
    pub role: Option<Role>,
}

/// Subset of a collection visible to a viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every document.
    All,
    /// Documents owned by this user id.
    Owner(String),
    /// Nothing may be listed.
    Nothing,
}

impl ViewerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: Some(role),
        }
    }

    pub fn client(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Client)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_some_and(|role| role.is_admin())
    }

    pub fn scope_for(&self, collection: Collection) -> Scope {
        match collection {
            Collection::Products => Scope::All,
            Collection::Users if self.is_admin() => Scope::All,
            Collection::Users => Scope::Nothing,
            Collection::Orders => match (&self.user_id, self.role) {
                (Some(_), Some(role)) if role.is_admin() => Scope::All,
                (Some(user_id), Some(Role::Client)) => Scope::Owner(user_id.clone()),
                _ => Scope::Nothing,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_products_are_public() {
        assert_eq!(
            ViewerContext::anonymous().scope_for(Collection::Products),
            Scope::All
        );
    }

    #[test]
    fn test_order_scopes() {
        assert_eq!(
            ViewerContext::admin("a1").scope_for(Collection::Orders),
            Scope::All
        );
        assert_eq!(
            ViewerContext::client("c1").scope_for(Collection::Orders),
            Scope::Owner("c1".into())
        );
        assert_eq!(
            ViewerContext::anonymous().scope_for(Collection::Orders),
            Scope::Nothing
        );
    }

    #[test]
    fn test_user_list_is_admin_only() {
        assert_eq!(
            ViewerContext::new("s1", Role::SuperAdmin).scope_for(Collection::Users),
            Scope::All
        );
        assert_eq!(
            ViewerContext::client("c1").scope_for(Collection::Users),
            Scope::Nothing
        );
    }
}
