//! Authorization-guarded secure store.
//!
//! | operation | required privilege                  |
//! |-----------|-------------------------------------|
//! | `put`     | `ADMIN` on the key                  |
//! | `get`     | `READ` on the namespace and the key |
//! | `delete`  | `ADMIN` on the key                  |
//! | `list`    | filtered to keys with any privilege |
//!
//! The privilege check always runs first, so a denied caller causes no side
//! effect and learns nothing about whether the key exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::{SecretBytes, SecureStoreBackend, SecureStoreData, SecureStoreMetadata, StoreError};
use crate::authz::enforcer::AuthorizationEnforcer;
use crate::context::RequestContext;
use crate::identity::{is_valid_name, Action, ResourceId};
use crate::namespace::{NamespaceAdmin, NamespaceGuard};

/// Secure store with every operation checked by the enforcer.
pub struct SecureStoreService {
    enforcer: Arc<AuthorizationEnforcer>,
    namespaces: Arc<NamespaceAdmin>,
    backend: Arc<dyn SecureStoreBackend>,
}

impl std::fmt::Debug for SecureStoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStoreService")
            .field("enforcer", &self.enforcer)
            .finish_non_exhaustive()
    }
}

impl SecureStoreService {
    /// Create the service over `backend`.
    pub fn new(
        enforcer: Arc<AuthorizationEnforcer>,
        namespaces: Arc<NamespaceAdmin>,
        backend: Arc<dyn SecureStoreBackend>,
    ) -> Self {
        Self {
            enforcer,
            namespaces,
            backend,
        }
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<NamespaceGuard<'_>, StoreError> {
        self.namespaces
            .hold(namespace)
            .await
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_owned()))
    }

    /// Store `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// [`StoreError::Authz`] without `ADMIN` on the key,
    /// [`StoreError::InvalidName`], or [`StoreError::NamespaceNotFound`].
    pub async fn put(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key: &str,
        value: impl Into<Vec<u8>>,
        description: &str,
        properties: BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let resource = ResourceId::secure_key(namespace, key);
        self.enforcer.enforce(ctx, &resource, Action::Admin).await?;
        if !is_valid_name(key) {
            return Err(StoreError::InvalidName(key.to_owned()));
        }
        let _namespace = self.ensure_namespace(namespace).await?;

        let data = SecureStoreData {
            metadata: SecureStoreMetadata {
                name: key.to_owned(),
                description: description.to_owned(),
                created_at: chrono::Utc::now().timestamp_millis(),
                properties,
            },
            data: SecretBytes::new(value),
        };
        self.backend.put(namespace, data).await?;
        info!(principal = %ctx.principal(), namespace, key, "stored secure key");
        Ok(())
    }

    /// Fetch a key with its metadata.
    ///
    /// # Errors
    ///
    /// [`StoreError::Authz`] without `READ` on the namespace and the key,
    /// [`StoreError::NamespaceNotFound`], or [`StoreError::NotFound`].
    pub async fn get(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key: &str,
    ) -> Result<SecureStoreData, StoreError> {
        let resource = ResourceId::secure_key(namespace, key);
        self.enforcer
            .enforce(ctx, &resource.namespace_of(), Action::Read)
            .await?;
        self.enforcer.enforce(ctx, &resource, Action::Read).await?;
        let _namespace = self.ensure_namespace(namespace).await?;
        self.backend.get(namespace, key).await
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// [`StoreError::Authz`] without `ADMIN` on the key,
    /// [`StoreError::NamespaceNotFound`], or [`StoreError::NotFound`].
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let resource = ResourceId::secure_key(namespace, key);
        self.enforcer.enforce(ctx, &resource, Action::Admin).await?;
        let _namespace = self.ensure_namespace(namespace).await?;
        self.backend.delete(namespace, key).await?;
        info!(principal = %ctx.principal(), namespace, key, "deleted secure key");
        Ok(())
    }

    /// Metadata of the keys in `namespace` the caller holds any privilege
    /// on, ordered by name.
    ///
    /// # Errors
    ///
    /// [`StoreError::NamespaceNotFound`] or an authorizer failure; never a
    /// denial.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        namespace: &str,
    ) -> Result<Vec<SecureStoreMetadata>, StoreError> {
        let all = {
            let _namespace = self.ensure_namespace(namespace).await?;
            self.backend.list(namespace).await?
        };
        let visible = self
            .enforcer
            .filter_visible(ctx, all, |meta| {
                ResourceId::secure_key(namespace, meta.name.clone())
            })
            .await?;
        Ok(visible)
    }
}
