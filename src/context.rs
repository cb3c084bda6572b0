//! Per-request security context.
//!
//! Every guarded call receives the context explicitly instead of reading a
//! thread-local "current user", so concurrent requests never share state.

use crate::identity::Principal;

/// Identity on whose behalf a call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    principal: Principal,
    /// Set only by an open bootstrap window; see [`crate::authz::enforcer`].
    bootstrap: bool,
}

impl RequestContext {
    /// Context for a request made by `principal`.
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            bootstrap: false,
        }
    }

    /// Context for the user `name`.
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(Principal::user(name))
    }

    /// Effective principal of this request.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// A copy of this context acting as `principal` instead.
    ///
    /// Impersonation never carries the bootstrap marker along.
    pub fn impersonate(&self, principal: Principal) -> Self {
        Self::new(principal)
    }

    pub(crate) fn for_bootstrap(principal: Principal) -> Self {
        Self {
            principal,
            bootstrap: true,
        }
    }

    pub(crate) fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }
}
