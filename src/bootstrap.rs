//! Startup side effects and the bounded wait that observes them.
//!
//! The default namespace is created asynchronously after the services are
//! built. Setup code that depends on it calls [`wait_for`], which polls a
//! condition until it holds or a timeout elapses. The wait always ends
//! within its bound.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::authz::enforcer::AuthorizationEnforcer;
use crate::context::RequestContext;
use crate::namespace::{NamespaceAdmin, NamespaceError, NamespaceMeta, DEFAULT_NAMESPACE};

/// Bootstrap errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The condition did not hold within the bound.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout {
        /// Description of the awaited condition.
        what: String,
        /// The configured bound.
        waited: Duration,
    },
}

/// Poll `condition` every `poll_interval` until it returns `true`.
///
/// # Errors
///
/// Returns [`BootstrapError::Timeout`] if `timeout` elapses first. A
/// condition evaluation still in flight at that point is abandoned.
pub async fn wait_for<F, Fut>(
    what: &str,
    timeout: Duration,
    poll_interval: Duration,
    mut condition: F,
) -> Result<(), BootstrapError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    let poll = async {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            if condition().await {
                return attempts;
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(attempts) => {
            debug!(
                what,
                attempts,
                elapsed_ms = started.elapsed().as_millis(),
                "condition met"
            );
            Ok(())
        }
        Err(_) => {
            warn!(what, timeout_ms = timeout.as_millis(), "gave up waiting");
            Err(BootstrapError::Timeout {
                what: what.to_owned(),
                waited: timeout,
            })
        }
    }
}

/// Create the default namespace as the master principal, through the
/// enforcer's bootstrap window. Does nothing if it already exists.
///
/// # Errors
///
/// Fails if creation is denied, which happens when the bootstrap window was
/// already used and the master holds no `ADMIN` privilege on the namespace.
pub async fn create_default_namespace(
    enforcer: &AuthorizationEnforcer,
    namespaces: &NamespaceAdmin,
) -> Result<(), NamespaceError> {
    if namespaces.exists(DEFAULT_NAMESPACE).await {
        debug!("default namespace already present");
        return Ok(());
    }

    let window = enforcer.open_bootstrap_window();
    let ctx = match &window {
        Some(window) => window.context(),
        None => {
            warn!("bootstrap window already used, creating default namespace without bypass");
            RequestContext::new(enforcer.master().clone())
        }
    };
    let result = namespaces
        .create(&ctx, NamespaceMeta::new(DEFAULT_NAMESPACE, "Default namespace"))
        .await;
    drop(window);

    match result {
        Ok(()) => {
            info!(namespace = DEFAULT_NAMESPACE, "bootstrap complete");
            Ok(())
        }
        Err(NamespaceError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Run [`create_default_namespace`] in the background after `delay`.
pub fn spawn_default_namespace(
    enforcer: Arc<AuthorizationEnforcer>,
    namespaces: Arc<NamespaceAdmin>,
    delay: Duration,
) -> JoinHandle<Result<(), NamespaceError>> {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = create_default_namespace(&enforcer, &namespaces).await;
        if let Err(e) = &result {
            warn!(error = %e, "default namespace creation failed");
        }
        result
    })
}
