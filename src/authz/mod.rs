//! Pluggable authorization engine.
//!
//! One [`Authorizer`] implementation is active per process. It is selected
//! by configuration through [`loader::AuthorizerInstantiator`], optionally
//! wrapped in a [`cache::CachingAuthorizer`], and consulted by the
//! [`enforcer::AuthorizationEnforcer`] at every guarded operation.

pub mod cache;
pub mod enforcer;
pub mod loader;
pub mod memory;
pub mod noop;

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::{Action, Authorizable, Principal, Privilege};

/// Authorization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    /// The principal does not hold the required privilege.
    #[error("principal '{principal}' is not authorized to perform {action} on '{resource}'")]
    Denied {
        /// Principal that was denied.
        principal: Principal,
        /// Resource the action targeted.
        resource: Authorizable,
        /// Action that was denied.
        action: Action,
    },

    /// No authorizer could be loaded. Fatal at startup.
    #[error("authorizer unavailable: {0}")]
    Unavailable(String),

    /// The role does not exist.
    #[error("role not found: {0}")]
    RoleNotFound(Principal),

    /// The role already exists.
    #[error("role already exists: {0}")]
    RoleAlreadyExists(Principal),

    /// The active authorizer does not implement this operation.
    #[error("operation '{0}' is not supported by this authorizer")]
    Unsupported(&'static str),

    /// The authorizer backend failed.
    #[error("authorizer backend error: {0}")]
    Backend(String),
}

impl AuthzError {
    /// Whether this error is an authorization denial.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

/// Contract every authorization plugin implements.
///
/// Implementations are shared process-wide and must tolerate concurrent
/// calls. `grant` and `revoke` are idempotent and all-or-nothing.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Grant `actions` on `resource` to `principal`.
    async fn grant(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        actions: &BTreeSet<Action>,
    ) -> Result<(), AuthzError>;

    /// Revoke `actions` on `resource` from `principal`.
    async fn revoke(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        actions: &BTreeSet<Action>,
    ) -> Result<(), AuthzError>;

    /// Revoke every action `principal` holds on `resource`.
    async fn revoke_all(
        &self,
        resource: &Authorizable,
        principal: &Principal,
    ) -> Result<(), AuthzError> {
        self.revoke(resource, principal, &Action::ALL.into_iter().collect())
            .await
    }

    /// Succeed iff `principal` holds `(resource, action)`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Denied`] when the privilege is not held.
    async fn enforce(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        action: Action,
    ) -> Result<(), AuthzError>;

    /// Current privilege set of `principal`.
    async fn list_privileges(&self, principal: &Principal)
        -> Result<BTreeSet<Privilege>, AuthzError>;

    /// Create a role.
    async fn create_role(&self, _role: &Principal) -> Result<(), AuthzError> {
        Err(AuthzError::Unsupported("create_role"))
    }

    /// Drop a role, detaching it from every principal.
    async fn drop_role(&self, _role: &Principal) -> Result<(), AuthzError> {
        Err(AuthzError::Unsupported("drop_role"))
    }

    /// Assign an existing role to `principal`.
    async fn add_role_to_principal(
        &self,
        _role: &Principal,
        _principal: &Principal,
    ) -> Result<(), AuthzError> {
        Err(AuthzError::Unsupported("add_role_to_principal"))
    }

    /// Remove a role assignment from `principal`.
    async fn remove_role_from_principal(
        &self,
        _role: &Principal,
        _principal: &Principal,
    ) -> Result<(), AuthzError> {
        Err(AuthzError::Unsupported("remove_role_from_principal"))
    }

    /// Roles assigned to `principal`.
    async fn list_roles(&self, _principal: &Principal) -> Result<BTreeSet<Principal>, AuthzError> {
        Err(AuthzError::Unsupported("list_roles"))
    }
}
