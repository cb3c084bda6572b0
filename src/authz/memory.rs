//! In-memory authorizer.
//!
//! Privilege state lives in a single map from principal to privilege set,
//! guarded by a tokio `RwLock`: `grant`/`revoke` take the write lock,
//! `enforce`/`list_privileges` take the read lock. Nothing is persisted.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{AuthzError, Authorizer};
use crate::identity::{Action, Authorizable, Principal, PrincipalKind, Privilege};

#[derive(Debug, Default)]
struct State {
    privileges: HashMap<Principal, BTreeSet<Privilege>>,
    roles: BTreeSet<Principal>,
    /// principal -> roles assigned to it
    assignments: HashMap<Principal, BTreeSet<Principal>>,
}

impl State {
    fn holds(&self, principal: &Principal, privilege: &Privilege) -> bool {
        self.privileges
            .get(principal)
            .is_some_and(|held| held.contains(privilege))
    }

    fn require_role(&self, role: &Principal) -> Result<(), AuthzError> {
        if role.kind() == PrincipalKind::Role && self.roles.contains(role) {
            Ok(())
        } else {
            Err(AuthzError::RoleNotFound(role.clone()))
        }
    }
}

/// Authorizer keeping all privileges and roles in process memory.
///
/// Privileges granted to a role are held by every principal the role is
/// assigned to. Actions never imply one another.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizer {
    state: RwLock<State>,
}

impl InMemoryAuthorizer {
    /// Create an authorizer with no privileges.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Authorizer for InMemoryAuthorizer {
    async fn grant(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        actions: &BTreeSet<Action>,
    ) -> Result<(), AuthzError> {
        let mut state = self.state.write().await;
        let held = state.privileges.entry(principal.clone()).or_default();
        for action in actions {
            held.insert(Privilege::new(resource.clone(), *action));
        }
        debug!(%principal, %resource, ?actions, "granted privileges");
        Ok(())
    }

    async fn revoke(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        actions: &BTreeSet<Action>,
    ) -> Result<(), AuthzError> {
        let mut state = self.state.write().await;
        if let Some(held) = state.privileges.get_mut(principal) {
            held.retain(|p| !(p.authorizable == *resource && actions.contains(&p.action)));
            if held.is_empty() {
                state.privileges.remove(principal);
            }
        }
        debug!(%principal, %resource, ?actions, "revoked privileges");
        Ok(())
    }

    async fn enforce(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        action: Action,
    ) -> Result<(), AuthzError> {
        let state = self.state.read().await;
        let wanted = Privilege::new(resource.clone(), action);

        if state.holds(principal, &wanted) {
            return Ok(());
        }
        let via_role = state
            .assignments
            .get(principal)
            .is_some_and(|roles| roles.iter().any(|role| state.holds(role, &wanted)));
        if via_role {
            return Ok(());
        }

        Err(AuthzError::Denied {
            principal: principal.clone(),
            resource: resource.clone(),
            action,
        })
    }

    async fn list_privileges(
        &self,
        principal: &Principal,
    ) -> Result<BTreeSet<Privilege>, AuthzError> {
        let state = self.state.read().await;
        Ok(state.privileges.get(principal).cloned().unwrap_or_default())
    }

    async fn create_role(&self, role: &Principal) -> Result<(), AuthzError> {
        if role.kind() != PrincipalKind::Role {
            return Err(AuthzError::RoleNotFound(role.clone()));
        }
        let mut state = self.state.write().await;
        if !state.roles.insert(role.clone()) {
            return Err(AuthzError::RoleAlreadyExists(role.clone()));
        }
        Ok(())
    }

    async fn drop_role(&self, role: &Principal) -> Result<(), AuthzError> {
        let mut state = self.state.write().await;
        state.require_role(role)?;
        state.roles.remove(role);
        state.privileges.remove(role);
        for roles in state.assignments.values_mut() {
            roles.remove(role);
        }
        state.assignments.retain(|_, roles| !roles.is_empty());
        Ok(())
    }

    async fn add_role_to_principal(
        &self,
        role: &Principal,
        principal: &Principal,
    ) -> Result<(), AuthzError> {
        let mut state = self.state.write().await;
        state.require_role(role)?;
        state
            .assignments
            .entry(principal.clone())
            .or_default()
            .insert(role.clone());
        Ok(())
    }

    async fn remove_role_from_principal(
        &self,
        role: &Principal,
        principal: &Principal,
    ) -> Result<(), AuthzError> {
        let mut state = self.state.write().await;
        state.require_role(role)?;
        if let Some(roles) = state.assignments.get_mut(principal) {
            roles.remove(role);
            if roles.is_empty() {
                state.assignments.remove(principal);
            }
        }
        Ok(())
    }

    async fn list_roles(&self, principal: &Principal) -> Result<BTreeSet<Principal>, AuthzError> {
        let state = self.state.read().await;
        Ok(state.assignments.get(principal).cloned().unwrap_or_default())
    }
}
