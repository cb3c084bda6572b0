//! Namespace administration.
//!
//! Namespaces partition the secure store. Creating or deleting one needs
//! `ADMIN` on the namespace itself, which is why the `default` namespace is
//! created through the bootstrap window rather than by a regular caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use crate::authz::enforcer::AuthorizationEnforcer;
use crate::authz::AuthzError;
use crate::context::RequestContext;
use crate::identity::{is_valid_name, Action, ResourceId};
use crate::store::{SecureStoreBackend, StoreError};

/// Name of the namespace created at startup.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Held while writing into a namespace; deletion waits for it.
pub(crate) type NamespaceGuard<'a> = RwLockReadGuard<'a, BTreeMap<String, NamespaceMeta>>;

/// Namespace errors.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// Authorization denied or the authorizer failed.
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// A namespace with this name exists.
    #[error("namespace already exists: {0}")]
    AlreadyExists(String),

    /// No namespace with this name.
    #[error("namespace not found: {0}")]
    NotFound(String),

    /// The name is not allowed.
    #[error("invalid namespace name '{0}': use letters, digits, '_' or '-'")]
    InvalidName(String),

    /// The namespace cannot be deleted.
    #[error("namespace '{0}' is reserved and cannot be deleted")]
    Protected(String),

    /// Dropping the namespace's keys failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NamespaceError {
    /// Whether this error is an authorization denial.
    pub fn is_denied(&self) -> bool {
        match self {
            Self::Authz(e) => e.is_denied(),
            Self::Store(e) => e.is_denied(),
            _ => false,
        }
    }
}

/// Namespace metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMeta {
    /// Namespace name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl NamespaceMeta {
    /// Metadata stamped with the current time.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Guarded namespace registry.
pub struct NamespaceAdmin {
    enforcer: Arc<AuthorizationEnforcer>,
    store: Arc<dyn SecureStoreBackend>,
    namespaces: RwLock<BTreeMap<String, NamespaceMeta>>,
}

impl std::fmt::Debug for NamespaceAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceAdmin")
            .field("enforcer", &self.enforcer)
            .finish_non_exhaustive()
    }
}

impl NamespaceAdmin {
    /// Create an empty registry. `store` is used to drop a deleted
    /// namespace's keys.
    pub fn new(enforcer: Arc<AuthorizationEnforcer>, store: Arc<dyn SecureStoreBackend>) -> Self {
        Self {
            enforcer,
            store,
            namespaces: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a namespace. Requires `ADMIN` on it.
    ///
    /// # Errors
    ///
    /// [`NamespaceError::Authz`] on denial, [`NamespaceError::InvalidName`],
    /// or [`NamespaceError::AlreadyExists`].
    pub async fn create(
        &self,
        ctx: &RequestContext,
        meta: NamespaceMeta,
    ) -> Result<(), NamespaceError> {
        let resource = ResourceId::namespace(meta.name.clone());
        self.enforcer.enforce(ctx, &resource, Action::Admin).await?;
        if !is_valid_name(&meta.name) {
            return Err(NamespaceError::InvalidName(meta.name));
        }

        let mut namespaces = self.namespaces.write().await;
        if namespaces.contains_key(&meta.name) {
            return Err(NamespaceError::AlreadyExists(meta.name));
        }
        info!(principal = %ctx.principal(), namespace = %meta.name, "created namespace");
        namespaces.insert(meta.name.clone(), meta);
        Ok(())
    }

    /// Whether the namespace exists. Unguarded system query.
    pub async fn exists(&self, name: &str) -> bool {
        self.namespaces.read().await.contains_key(name)
    }

    /// Read guard over the registry if `name` exists. The namespace cannot
    /// be deleted while the guard is held.
    pub(crate) async fn hold(&self, name: &str) -> Option<NamespaceGuard<'_>> {
        let namespaces = self.namespaces.read().await;
        namespaces.contains_key(name).then_some(namespaces)
    }

    /// Namespace metadata. Requires `READ` on it.
    ///
    /// # Errors
    ///
    /// [`NamespaceError::Authz`] on denial or [`NamespaceError::NotFound`].
    pub async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<NamespaceMeta, NamespaceError> {
        self.enforcer
            .enforce(ctx, &ResourceId::namespace(name), Action::Read)
            .await?;
        self.namespaces
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| NamespaceError::NotFound(name.to_owned()))
    }

    /// Namespaces the caller holds any privilege on, ordered by name.
    ///
    /// # Errors
    ///
    /// Propagates authorizer failures; never a denial.
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<NamespaceMeta>, NamespaceError> {
        let all: Vec<NamespaceMeta> = self.namespaces.read().await.values().cloned().collect();
        let visible = self
            .enforcer
            .filter_visible(ctx, all, |meta| ResourceId::namespace(meta.name.clone()))
            .await?;
        Ok(visible)
    }

    /// Delete a namespace and every key in it. Requires `ADMIN` on it.
    ///
    /// # Errors
    ///
    /// [`NamespaceError::Authz`] on denial, [`NamespaceError::Protected`] for
    /// the default namespace, or [`NamespaceError::NotFound`].
    pub async fn delete(&self, ctx: &RequestContext, name: &str) -> Result<(), NamespaceError> {
        self.enforcer
            .enforce(ctx, &ResourceId::namespace(name), Action::Admin)
            .await?;
        if name == DEFAULT_NAMESPACE {
            return Err(NamespaceError::Protected(name.to_owned()));
        }

        let mut namespaces = self.namespaces.write().await;
        if !namespaces.contains_key(name) {
            return Err(NamespaceError::NotFound(name.to_owned()));
        }
        self.store.delete_namespace(name).await?;
        namespaces.remove(name);
        info!(principal = %ctx.principal(), namespace = %name, "deleted namespace");
        Ok(())
    }
}
