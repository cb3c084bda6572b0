//! Enforcement point used by the guarded services.
//!
//! Every mutating or listing operation on a protected resource passes
//! through [`AuthorizationEnforcer`]. The only exception is the bootstrap
//! window: a one-shot guard that lets the master principal initialize system
//! state (the default namespace) before anyone could hold privileges on it.
//! No privilege is granted for this, so there is nothing to revoke
//! afterwards; once the guard is dropped the bypass is gone for good.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::{AuthzError, Authorizer};
use crate::context::RequestContext;
use crate::identity::{Action, Principal, ResourceId};

const WINDOW_UNUSED: u8 = 0;
const WINDOW_OPEN: u8 = 1;
const WINDOW_SEALED: u8 = 2;

/// Gate in front of the authorizer.
pub struct AuthorizationEnforcer {
    authorizer: Arc<dyn Authorizer>,
    enabled: bool,
    master: Principal,
    window: Arc<AtomicU8>,
}

impl std::fmt::Debug for AuthorizationEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEnforcer")
            .field("enabled", &self.enabled)
            .field("master", &self.master)
            .field("window", &self.window.load(Ordering::SeqCst))
            .finish()
    }
}

impl AuthorizationEnforcer {
    /// Create an enforcer. With `enabled == false` every check passes.
    pub fn new(authorizer: Arc<dyn Authorizer>, enabled: bool, master: Principal) -> Self {
        Self {
            authorizer,
            enabled,
            master,
            window: Arc::new(AtomicU8::new(WINDOW_UNUSED)),
        }
    }

    /// The underlying authorizer.
    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.authorizer
    }

    /// The configured master principal.
    pub fn master(&self) -> &Principal {
        &self.master
    }

    /// Whether checks are enforced.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Open the bootstrap window.
    ///
    /// Returns `None` if a window was already opened: there is at most one
    /// per enforcer, and it cannot be reopened once sealed.
    pub fn open_bootstrap_window(&self) -> Option<BootstrapWindow> {
        self.window
            .compare_exchange(
                WINDOW_UNUSED,
                WINDOW_OPEN,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .ok()?;
        info!(master = %self.master, "bootstrap window opened");
        Some(BootstrapWindow {
            state: Arc::clone(&self.window),
            master: self.master.clone(),
        })
    }

    /// Whether the bootstrap window has been sealed.
    pub fn is_bootstrap_sealed(&self) -> bool {
        self.window.load(Ordering::SeqCst) == WINDOW_SEALED
    }

    fn bypasses(&self, ctx: &RequestContext) -> bool {
        ctx.is_bootstrap()
            && *ctx.principal() == self.master
            && self.window.load(Ordering::SeqCst) == WINDOW_OPEN
    }

    /// Require `action` on `resource` for the context's principal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Denied`] when the principal lacks the privilege,
    /// or the authorizer's own error if it fails.
    pub async fn enforce(
        &self,
        ctx: &RequestContext,
        resource: &ResourceId,
        action: Action,
    ) -> Result<(), AuthzError> {
        self.check(ctx, resource, action, true).await
    }

    /// `audit` logs denials at info; visibility checks log them at debug.
    async fn check(
        &self,
        ctx: &RequestContext,
        resource: &ResourceId,
        action: Action,
        audit: bool,
    ) -> Result<(), AuthzError> {
        if !self.enabled {
            return Ok(());
        }
        let principal = ctx.principal();
        if self.bypasses(ctx) {
            debug!(%principal, %resource, %action, "bootstrap bypass");
            return Ok(());
        }

        let authorizable = resource.to_authorizable();
        let result = self.authorizer.enforce(&authorizable, principal, action).await;
        if let Err(e) = &result {
            if e.is_denied() && audit {
                info!(%principal, resource = %authorizable, %action, "authorization denied");
            } else if e.is_denied() {
                debug!(%principal, resource = %authorizable, %action, "not visible");
            }
        }
        result
    }

    /// Whether the principal holds at least one action on `resource`.
    ///
    /// # Errors
    ///
    /// Propagates authorizer failures. Never returns [`AuthzError::Denied`].
    pub async fn is_visible(
        &self,
        ctx: &RequestContext,
        resource: &ResourceId,
    ) -> Result<bool, AuthzError> {
        for action in Action::ALL {
            match self.check(ctx, resource, action, false).await {
                Ok(()) => return Ok(true),
                Err(e) if e.is_denied() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Keep the items whose resource the caller can see.
    ///
    /// # Errors
    ///
    /// Propagates authorizer failures. Never returns [`AuthzError::Denied`].
    pub async fn filter_visible<T, F>(
        &self,
        ctx: &RequestContext,
        items: Vec<T>,
        resource_of: F,
    ) -> Result<Vec<T>, AuthzError>
    where
        T: Send,
        F: Fn(&T) -> ResourceId + Send + Sync,
    {
        let total = items.len();
        let mut visible = Vec::with_capacity(total);
        for item in items {
            if self.is_visible(ctx, &resource_of(&item)).await? {
                visible.push(item);
            }
        }
        debug!(
            principal = %ctx.principal(),
            total,
            visible = visible.len(),
            "filtered listing"
        );
        Ok(visible)
    }
}

/// One-shot bootstrap bypass for the master principal.
///
/// Dropping the window seals it; it can never be opened again.
#[derive(Debug)]
pub struct BootstrapWindow {
    state: Arc<AtomicU8>,
    master: Principal,
}

impl BootstrapWindow {
    /// Request context that bypasses checks while this window is open.
    pub fn context(&self) -> RequestContext {
        RequestContext::for_bootstrap(self.master.clone())
    }

    /// Seal the window now.
    pub fn close(self) {}
}

impl Drop for BootstrapWindow {
    fn drop(&mut self) {
        self.state.store(WINDOW_SEALED, Ordering::SeqCst);
        info!(master = %self.master, "bootstrap window sealed");
    }
}
