//! Secure credential storage.
//!
//! [`SecureStoreBackend`] is the raw storage seam; it performs no access
//! checks. Callers go through [`service::SecureStoreService`], which guards
//! every operation with the authorization enforcer. At-rest encryption is
//! the backend's concern; [`InMemorySecureStore`] keeps values in memory.

pub mod service;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::authz::AuthzError;

/// Secure store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Authorization denied or the authorizer failed.
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// The namespace does not exist.
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// No key with this name in the namespace.
    #[error("secure key '{name}' not found in namespace '{namespace}'")]
    NotFound {
        /// Namespace searched.
        namespace: String,
        /// Key name requested.
        name: String,
    },

    /// The key name is not allowed.
    #[error("invalid secure key name '{0}': use letters, digits, '_' or '-'")]
    InvalidName(String),

    /// The storage backend failed.
    #[error("secure store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error is an authorization denial.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Authz(e) if e.is_denied())
    }
}

/// Secret bytes that never appear in logs.
///
/// Debug output always shows `__REDACTED__`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// Wrap a secret value.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    /// Expose the secret bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("__REDACTED__")
    }
}

/// Everything about a stored key except its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureStoreMetadata {
    /// Key name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Caller-supplied properties.
    pub properties: BTreeMap<String, String>,
}

/// A stored key: metadata plus the secret value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureStoreData {
    /// Key metadata.
    pub metadata: SecureStoreMetadata,
    /// Secret value.
    pub data: SecretBytes,
}

/// Raw storage for secure keys, partitioned by namespace.
#[async_trait]
pub trait SecureStoreBackend: Send + Sync {
    /// Store `data` under its metadata name. Overwrites any existing value.
    async fn put(&self, namespace: &str, data: SecureStoreData) -> Result<(), StoreError>;

    /// Fetch a key.
    async fn get(&self, namespace: &str, name: &str) -> Result<SecureStoreData, StoreError>;

    /// Delete a key.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Metadata of every key in `namespace`, ordered by name.
    async fn list(&self, namespace: &str) -> Result<Vec<SecureStoreMetadata>, StoreError>;

    /// Drop every key in `namespace`.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), StoreError>;
}

/// Backend keeping all keys in process memory.
#[derive(Debug, Default)]
pub struct InMemorySecureStore {
    entries: RwLock<HashMap<String, BTreeMap<String, SecureStoreData>>>,
}

impl InMemorySecureStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(namespace: &str, name: &str) -> StoreError {
    StoreError::NotFound {
        namespace: namespace.to_owned(),
        name: name.to_owned(),
    }
}

#[async_trait]
impl SecureStoreBackend for InMemorySecureStore {
    async fn put(&self, namespace: &str, data: SecureStoreData) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries
            .entry(namespace.to_owned())
            .or_default()
            .insert(data.metadata.name.clone(), data);
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<SecureStoreData, StoreError> {
        let entries = self.entries.read().await;
        entries
            .get(namespace)
            .and_then(|keys| keys.get(name))
            .cloned()
            .ok_or_else(|| not_found(namespace, name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries
            .get_mut(namespace)
            .and_then(|keys| keys.remove(name))
            .map(|_| ())
            .ok_or_else(|| not_found(namespace, name))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<SecureStoreMetadata>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(namespace)
            .map(|keys| keys.values().map(|d| d.metadata.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(namespace);
        Ok(())
    }
}
