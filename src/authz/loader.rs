//! Selects and instantiates the process's single authorizer.
//!
//! Implementations are linked into the binary and registered by name in an
//! [`AuthorizerRegistry`]. Configuration picks one; the
//! [`AuthorizerInstantiator`] builds it once at startup and hands out shared
//! handles. Failure to load is fatal: the caller must not start serving.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::cache::{CacheStats, CachingAuthorizer};
use super::memory::InMemoryAuthorizer;
use super::noop::NoopAuthorizer;
use super::{AuthzError, Authorizer};
use crate::config::SecurityConfig;

/// Registered name of [`InMemoryAuthorizer`].
pub const IN_MEMORY_EXTENSION: &str = "in-memory";

/// Name reported when authorization is disabled.
pub const NOOP_EXTENSION: &str = "noop";

/// What a factory receives when its extension is selected.
#[derive(Debug, Clone, Default)]
pub struct ExtensionContext {
    /// Registered name the extension was selected under.
    pub name: String,
    /// `security.authorization.extension_properties` from configuration.
    pub properties: BTreeMap<String, String>,
}

/// Builds an authorizer from its extension context.
pub type AuthorizerFactory = fn(&ExtensionContext) -> Result<Arc<dyn Authorizer>, AuthzError>;

/// Name → factory table of the authorizers linked into this binary.
#[derive(Clone, Default)]
pub struct AuthorizerRegistry {
    factories: BTreeMap<String, AuthorizerFactory>,
}

impl std::fmt::Debug for AuthorizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizerRegistry")
            .field("extensions", &self.names())
            .finish()
    }
}

impl AuthorizerRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding the built-in authorizers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(IN_MEMORY_EXTENSION, in_memory_factory);
        registry
    }

    /// Register `factory` under `name`, replacing any earlier registration.
    pub fn register(&mut self, name: impl Into<String>, factory: AuthorizerFactory) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            warn!(extension = %name, "replaced previously registered authorizer");
        }
    }

    /// Registered extension names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<AuthorizerFactory> {
        self.factories.get(name).copied()
    }
}

fn in_memory_factory(_context: &ExtensionContext) -> Result<Arc<dyn Authorizer>, AuthzError> {
    Ok(Arc::new(InMemoryAuthorizer::new()))
}

/// Owns the process's authorizer.
pub struct AuthorizerInstantiator {
    authorizer: Arc<dyn Authorizer>,
    extension: String,
    cache: Option<Arc<CachingAuthorizer>>,
}

impl std::fmt::Debug for AuthorizerInstantiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizerInstantiator")
            .field("extension", &self.extension)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl AuthorizerInstantiator {
    /// Load the configured authorizer.
    ///
    /// With security or authorization disabled this is the
    /// [`NoopAuthorizer`]. Otherwise the named extension is looked up in
    /// `registry`, instantiated, and wrapped in a [`CachingAuthorizer`] when
    /// `cache_max_entries > 0`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Unavailable`] if no extension is configured, the
    /// name is not registered, or the factory fails.
    pub fn load(
        security: &SecurityConfig,
        registry: &AuthorizerRegistry,
    ) -> Result<Self, AuthzError> {
        if !security.authorization_enabled() {
            info!("authorization disabled, all requests are allowed");
            return Ok(Self {
                authorizer: Arc::new(NoopAuthorizer),
                extension: NOOP_EXTENSION.to_owned(),
                cache: None,
            });
        }

        let authz = &security.authorization;
        let name = authz.extension.clone().ok_or_else(|| {
            AuthzError::Unavailable(
                "authorization is enabled but security.authorization.extension is not set"
                    .to_owned(),
            )
        })?;
        let factory = registry.get(&name).ok_or_else(|| {
            AuthzError::Unavailable(format!(
                "unknown authorizer extension '{name}' (registered: {})",
                registry.names().join(", ")
            ))
        })?;

        let context = ExtensionContext {
            name: name.clone(),
            properties: authz.extension_properties.clone(),
        };
        let plugin = factory(&context).map_err(|e| match e {
            AuthzError::Unavailable(_) => e,
            other => {
                AuthzError::Unavailable(format!("failed to instantiate authorizer '{name}': {other}"))
            }
        })?;

        let cache_config = authz.cache_config();
        let mut cache = None;
        let authorizer: Arc<dyn Authorizer> = if cache_config.max_entries > 0 {
            let caching = Arc::new(CachingAuthorizer::new(plugin, cache_config));
            cache = Some(Arc::clone(&caching));
            caching
        } else {
            plugin
        };

        info!(
            extension = %name,
            cache_max_entries = cache_config.max_entries,
            cache_ttl_secs = cache_config.ttl.as_secs(),
            "authorizer loaded"
        );

        Ok(Self {
            authorizer,
            extension: name,
            cache,
        })
    }

    /// Shared handle to the active authorizer.
    pub fn get(&self) -> Arc<dyn Authorizer> {
        Arc::clone(&self.authorizer)
    }

    /// Name of the loaded extension.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Decision cache counters, when caching is on.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }
}
