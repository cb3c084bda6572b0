//! Bounded decision cache in front of an authorizer.
//!
//! Only `enforce` decisions are cached, keyed by
//! `(principal, authorizable, action)`. Privilege state itself always stays
//! with the wrapped plugin. With `max_entries == 0` every call goes straight
//! through.
//!
//! Invalidation runs before `grant`/`revoke` return. A generation counter,
//! bumped on every mutation, keeps an `enforce` that raced with a mutation
//! from storing a decision computed against the old state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::trace;

use super::{AuthzError, Authorizer};
use crate::identity::{Action, Authorizable, Principal, PrincipalKind, Privilege};

/// Cache sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum cached decisions; `0` disables caching.
    pub max_entries: usize,
    /// Lifetime of a cached decision.
    pub ttl: Duration,
}

impl CacheConfig {
    /// A configuration with caching turned off.
    pub fn disabled() -> Self {
        Self {
            max_entries: 0,
            ttl: Duration::ZERO,
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Decisions currently cached.
    pub entries: usize,
    /// Configured bound.
    pub capacity: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that went to the plugin.
    pub misses: u64,
}

type CacheKey = (Principal, Authorizable, Action);

#[derive(Debug)]
struct Slot {
    allowed: bool,
    expires_at: Instant,
    tick: u64,
}

#[derive(Debug, Default)]
struct Decisions {
    slots: HashMap<CacheKey, Slot>,
    /// tick -> key, oldest first
    recency: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    generation: u64,
    hits: u64,
    misses: u64,
}

impl Decisions {
    fn touch(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick = self.next_tick.wrapping_add(1);
        tick
    }

    fn lookup(&mut self, key: &CacheKey, now: Instant) -> Option<bool> {
        let (allowed, expired, old_tick) = {
            let slot = self.slots.get(key)?;
            (slot.allowed, now >= slot.expires_at, slot.tick)
        };
        self.recency.remove(&old_tick);
        if expired {
            self.slots.remove(key);
            return None;
        }
        let tick = self.touch();
        if let Some(slot) = self.slots.get_mut(key) {
            slot.tick = tick;
        }
        self.recency.insert(tick, key.clone());
        Some(allowed)
    }

    fn insert(&mut self, key: CacheKey, allowed: bool, expires_at: Instant, capacity: usize) {
        let tick = self.touch();
        if let Some(old) = self.slots.insert(
            key.clone(),
            Slot {
                allowed,
                expires_at,
                tick,
            },
        ) {
            self.recency.remove(&old.tick);
        }
        self.recency.insert(tick, key);

        while self.slots.len() > capacity {
            let Some((_, evicted)) = self.recency.pop_first() else {
                break;
            };
            self.slots.remove(&evicted);
        }
    }

    fn invalidate_principal(&mut self, principal: &Principal) {
        self.generation = self.generation.wrapping_add(1);
        let recency = &mut self.recency;
        self.slots.retain(|(p, _, _), slot| {
            let keep = p != principal;
            if !keep {
                recency.remove(&slot.tick);
            }
            keep
        });
    }

    fn invalidate_all(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.slots.clear();
        self.recency.clear();
    }
}

/// Authorizer wrapper caching `enforce` decisions.
pub struct CachingAuthorizer {
    inner: Arc<dyn Authorizer>,
    config: CacheConfig,
    decisions: Mutex<Decisions>,
}

impl std::fmt::Debug for CachingAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingAuthorizer")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CachingAuthorizer {
    /// Wrap `inner` with a decision cache sized by `config`.
    pub fn new(inner: Arc<dyn Authorizer>, config: CacheConfig) -> Self {
        Self {
            inner,
            config,
            decisions: Mutex::new(Decisions::default()),
        }
    }

    /// Whether decisions are being cached at all.
    pub fn is_enabled(&self) -> bool {
        self.config.max_entries > 0
    }

    /// Current cache counters.
    pub fn stats(&self) -> CacheStats {
        let decisions = self.lock();
        CacheStats {
            entries: decisions.slots.len(),
            capacity: self.config.max_entries,
            hits: decisions.hits,
            misses: decisions.misses,
        }
    }

    // Invalidation must run even after a panic elsewhere poisoned the lock.
    fn lock(&self) -> MutexGuard<'_, Decisions> {
        self.decisions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop cached decisions that a change to `principal` could affect.
    fn invalidate(&self, principal: &Principal) {
        if !self.is_enabled() {
            return;
        }
        let mut decisions = self.lock();
        // Role privileges reach every member, so drop everything.
        if principal.kind() == PrincipalKind::Role {
            decisions.invalidate_all();
        } else {
            decisions.invalidate_principal(principal);
        }
        trace!(%principal, "invalidated cached decisions");
    }
}

#[async_trait]
impl Authorizer for CachingAuthorizer {
    async fn grant(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        actions: &BTreeSet<Action>,
    ) -> Result<(), AuthzError> {
        let result = self.inner.grant(resource, principal, actions).await;
        self.invalidate(principal);
        result
    }

    async fn revoke(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        actions: &BTreeSet<Action>,
    ) -> Result<(), AuthzError> {
        let result = self.inner.revoke(resource, principal, actions).await;
        self.invalidate(principal);
        result
    }

    async fn enforce(
        &self,
        resource: &Authorizable,
        principal: &Principal,
        action: Action,
    ) -> Result<(), AuthzError> {
        if !self.is_enabled() {
            return self.inner.enforce(resource, principal, action).await;
        }

        let key: CacheKey = (principal.clone(), resource.clone(), action);
        let generation = {
            let mut decisions = self.lock();
            match decisions.lookup(&key, Instant::now()) {
                Some(allowed) => {
                    decisions.hits = decisions.hits.wrapping_add(1);
                    return if allowed {
                        Ok(())
                    } else {
                        Err(AuthzError::Denied {
                            principal: principal.clone(),
                            resource: resource.clone(),
                            action,
                        })
                    };
                }
                None => {
                    decisions.misses = decisions.misses.wrapping_add(1);
                    decisions.generation
                }
            }
        };

        let result = self.inner.enforce(resource, principal, action).await;
        let allowed = match &result {
            Ok(()) => true,
            Err(e) if e.is_denied() => false,
            Err(_) => return result,
        };

        // A TTL past the clock's range leaves the decision uncached.
        let Some(expires_at) = Instant::now().checked_add(self.config.ttl) else {
            return result;
        };
        let mut decisions = self.lock();
        if decisions.generation == generation {
            decisions.insert(key, allowed, expires_at, self.config.max_entries);
        }
        result
    }

    async fn list_privileges(
        &self,
        principal: &Principal,
    ) -> Result<BTreeSet<Privilege>, AuthzError> {
        self.inner.list_privileges(principal).await
    }

    async fn create_role(&self, role: &Principal) -> Result<(), AuthzError> {
        self.inner.create_role(role).await
    }

    async fn drop_role(&self, role: &Principal) -> Result<(), AuthzError> {
        let result = self.inner.drop_role(role).await;
        self.invalidate(role);
        result
    }

    async fn add_role_to_principal(
        &self,
        role: &Principal,
        principal: &Principal,
    ) -> Result<(), AuthzError> {
        let result = self.inner.add_role_to_principal(role, principal).await;
        self.invalidate(principal);
        result
    }

    async fn remove_role_from_principal(
        &self,
        role: &Principal,
        principal: &Principal,
    ) -> Result<(), AuthzError> {
        let result = self.inner.remove_role_from_principal(role, principal).await;
        self.invalidate(principal);
        result
    }

    async fn list_roles(&self, principal: &Principal) -> Result<BTreeSet<Principal>, AuthzError> {
        self.inner.list_roles(principal).await
    }
}
