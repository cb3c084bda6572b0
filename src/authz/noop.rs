//! Authorizer used when security or authorization is turned off.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::{AuthzError, Authorizer};
use crate::identity::{Action, Authorizable, Principal, Privilege};

/// Allows every action and stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuthorizer;

#[async_trait]
impl Authorizer for NoopAuthorizer {
    async fn grant(
        &self,
        _resource: &Authorizable,
        _principal: &Principal,
        _actions: &BTreeSet<Action>,
    ) -> Result<(), AuthzError> {
        Ok(())
    }

    async fn revoke(
        &self,
        _resource: &Authorizable,
        _principal: &Principal,
        _actions: &BTreeSet<Action>,
    ) -> Result<(), AuthzError> {
        Ok(())
    }

    async fn enforce(
        &self,
        _resource: &Authorizable,
        _principal: &Principal,
        _action: Action,
    ) -> Result<(), AuthzError> {
        Ok(())
    }

    async fn list_privileges(
        &self,
        _principal: &Principal,
    ) -> Result<BTreeSet<Privilege>, AuthzError> {
        Ok(BTreeSet::new())
    }
}
