//! Wiring of the authorizer, enforcer, and guarded services.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::authz::cache::CacheStats;
use crate::authz::enforcer::AuthorizationEnforcer;
use crate::authz::loader::{AuthorizerInstantiator, AuthorizerRegistry};
use crate::authz::{Authorizer, AuthzError};
use crate::bootstrap::{self, BootstrapError};
use crate::config::{BootstrapConfig, Config};
use crate::namespace::{NamespaceAdmin, NamespaceError, DEFAULT_NAMESPACE};
use crate::store::service::SecureStoreService;
use crate::store::{InMemorySecureStore, SecureStoreBackend};

/// Everything a running process needs, built once at startup.
#[derive(Debug)]
pub struct Services {
    instantiator: AuthorizerInstantiator,
    enforcer: Arc<AuthorizationEnforcer>,
    namespaces: Arc<NamespaceAdmin>,
    secure_store: Arc<SecureStoreService>,
}

impl Services {
    /// Build the services over an in-memory secure store.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Unavailable`] if the configured authorizer cannot
    /// be loaded. The process must not start in that case.
    pub fn build(config: &Config, registry: &AuthorizerRegistry) -> Result<Self, AuthzError> {
        Self::build_with_backend(config, registry, Arc::new(InMemorySecureStore::new()))
    }

    /// Build the services over the given secure store backend.
    ///
    /// # Errors
    ///
    /// See [`Services::build`].
    pub fn build_with_backend(
        config: &Config,
        registry: &AuthorizerRegistry,
        backend: Arc<dyn SecureStoreBackend>,
    ) -> Result<Self, AuthzError> {
        let instantiator = AuthorizerInstantiator::load(&config.security, registry)?;
        let enforcer = Arc::new(AuthorizationEnforcer::new(
            instantiator.get(),
            config.security.authorization_enabled(),
            config.security.master_principal(),
        ));
        let namespaces = Arc::new(NamespaceAdmin::new(
            Arc::clone(&enforcer),
            Arc::clone(&backend),
        ));
        let secure_store = Arc::new(SecureStoreService::new(
            Arc::clone(&enforcer),
            Arc::clone(&namespaces),
            backend,
        ));

        Ok(Self {
            instantiator,
            enforcer,
            namespaces,
            secure_store,
        })
    }

    /// The active authorizer (cached when configured).
    pub fn authorizer(&self) -> Arc<dyn Authorizer> {
        self.instantiator.get()
    }

    /// Name of the loaded authorizer extension.
    pub fn extension(&self) -> &str {
        self.instantiator.extension()
    }

    /// Decision cache counters, when caching is on.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.instantiator.cache_stats()
    }

    /// The enforcement layer.
    pub fn enforcer(&self) -> &Arc<AuthorizationEnforcer> {
        &self.enforcer
    }

    /// Namespace administration.
    pub fn namespaces(&self) -> &Arc<NamespaceAdmin> {
        &self.namespaces
    }

    /// The guarded secure store.
    pub fn secure_store(&self) -> &Arc<SecureStoreService> {
        &self.secure_store
    }

    /// Start creating the default namespace in the background.
    pub fn spawn_bootstrap(&self, delay: Duration) -> JoinHandle<Result<(), NamespaceError>> {
        bootstrap::spawn_default_namespace(
            Arc::clone(&self.enforcer),
            Arc::clone(&self.namespaces),
            delay,
        )
    }

    /// Block until the default namespace exists, within `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Timeout`] if it does not appear in time.
    pub async fn wait_for_default_namespace(
        &self,
        bounds: &BootstrapConfig,
    ) -> Result<(), BootstrapError> {
        let namespaces = Arc::clone(&self.namespaces);
        bootstrap::wait_for(
            "default namespace creation",
            bounds.timeout(),
            bounds.poll_interval(),
            move || {
                let namespaces = Arc::clone(&namespaces);
                async move { namespaces.exists(DEFAULT_NAMESPACE).await }
            },
        )
        .await
    }
}
