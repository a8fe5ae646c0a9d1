//! In-memory storage backends and the local client cache.
//!
//! All types here are thread-safe (`DashMap`/`DashSet`) and suitable for
//! single-instance deployments, development and tests. Nothing survives a
//! restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use time::OffsetDateTime;

use super::cache::{CacheError, ClientCache};
use super::client::{Client, ClientFilter, ClientInput, ClientStorage};
use super::policy::{GroupingEdge, PolicyRule, PolicyStorage};
use super::user::{User, UserStorage};
use crate::AuthResult;
use crate::error::AuthError;

// =============================================================================
// Users
// =============================================================================

/// In-memory user storage with a unique email index.
#[derive(Default)]
pub struct MemoryUserStorage {
    users: DashMap<String, User>,
    emails: DashMap<String, String>,
}

impl MemoryUserStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if no user is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStorage for MemoryUserStorage {
    async fn create(&self, user: &User) -> AuthResult<()> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(AuthError::DuplicateEmail),
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
                self.users.insert(user.id.clone(), user.clone());
                Ok(())
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let Some(id) = self.emails.get(email).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn update(&self, user: &User) -> AuthResult<()> {
        let previous_email = match self.users.get(&user.id) {
            Some(existing) => existing.email.clone(),
            None => return Err(AuthError::not_found(format!("user {}", user.id))),
        };

        if previous_email != user.email {
            match self.emails.entry(user.email.clone()) {
                Entry::Occupied(owner) if owner.get() != &user.id => {
                    return Err(AuthError::DuplicateEmail);
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(user.id.clone());
                }
            }
            self.emails.remove(&previous_email);
        }

        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

// =============================================================================
// Clients
// =============================================================================

/// In-memory client storage keyed by bearer key.
#[derive(Default)]
pub struct MemoryClientStorage {
    clients: DashMap<String, Client>,
}

impl MemoryClientStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStorage for MemoryClientStorage {
    async fn is_exists(&self, bearer_key: &str) -> AuthResult<bool> {
        Ok(self.clients.contains_key(bearer_key))
    }

    async fn find_by_filter(&self, filter: &ClientFilter) -> AuthResult<Vec<Client>> {
        let mut found: Vec<Client> = self
            .clients
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn upsert(&self, inputs: &[ClientInput]) -> AuthResult<Vec<Client>> {
        let now = OffsetDateTime::now_utc();
        let mut stored = Vec::with_capacity(inputs.len());

        for input in inputs {
            let client = match self.clients.entry(input.bearer_key.clone()) {
                Entry::Occupied(mut existing) => {
                    let client = existing.get_mut();
                    client.name = input.name.clone();
                    client.updated_at = now;
                    client.clone()
                }
                Entry::Vacant(slot) => slot
                    .insert(Client {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: input.name.clone(),
                        bearer_key: input.bearer_key.clone(),
                        created_at: now,
                        updated_at: now,
                    })
                    .value()
                    .clone(),
            };
            stored.push(client);
        }

        Ok(stored)
    }

    async fn delete_by_filter(&self, filter: &ClientFilter) -> AuthResult<u64> {
        if filter.is_empty() {
            return Err(AuthError::invalid_request("delete filter must not be empty"));
        }

        let before = self.clients.len();
        self.clients.retain(|_, client| !filter.matches(client));
        Ok((before - self.clients.len()) as u64)
    }
}

// =============================================================================
// Policies
// =============================================================================

/// In-memory policy storage.
#[derive(Default)]
pub struct MemoryPolicyStorage {
    rules: DashSet<PolicyRule>,
    groupings: DashSet<GroupingEdge>,
}

impl MemoryPolicyStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStorage for MemoryPolicyStorage {
    async fn load_rules(&self) -> AuthResult<Vec<PolicyRule>> {
        Ok(self.rules.iter().map(|r| r.key().clone()).collect())
    }

    async fn load_groupings(&self) -> AuthResult<Vec<GroupingEdge>> {
        Ok(self.groupings.iter().map(|g| g.key().clone()).collect())
    }

    async fn add_rule(&self, rule: &PolicyRule) -> AuthResult<bool> {
        Ok(self.rules.insert(rule.clone()))
    }

    async fn add_grouping(&self, edge: &GroupingEdge) -> AuthResult<bool> {
        Ok(self.groupings.insert(edge.clone()))
    }

    async fn remove_grouping(&self, edge: &GroupingEdge) -> AuthResult<bool> {
        Ok(self.groupings.remove(edge).is_some())
    }
}

// =============================================================================
// Local Client Cache
// =============================================================================

/// Counters reported when the cache reaches capacity.
#[derive(Debug, Clone, Default)]
pub(crate) struct CacheStats {
    /// Number of entries currently in the cache.
    pub size: usize,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted by age or capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub(crate) fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CachedEntry {
    client: Client,
    expires_at: Instant,
}

/// Process-local client cache with TTL and a capacity bound.
///
/// When full, expired entries are swept first; if that frees nothing the
/// entry closest to expiry is evicted.
pub struct LocalClientCache {
    cache: DashMap<String, CachedEntry>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LocalClientCache {
    /// Creates a cache holding at most `max_entries` entries for `ttl` each.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.cache.retain(|_, entry| {
            if entry.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    fn evict_oldest(&self) {
        let oldest = self
            .cache
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest
            && self.cache.remove(&key).is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl ClientCache for LocalClientCache {
    async fn get(&self, bearer_key: &str) -> Result<Client, CacheError> {
        if let Some(entry) = self.cache.get(bearer_key) {
            if entry.expires_at > Instant::now() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.client.clone());
            }
            drop(entry);
            self.cache.remove(bearer_key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::Miss)
    }

    async fn set(&self, client: &Client) -> Result<(), CacheError> {
        if !self.cache.contains_key(&client.bearer_key)
            && self.cache.len() >= self.max_entries
            && self.cleanup_expired() == 0
        {
            self.evict_oldest();
            let stats = self.stats();
            tracing::debug!(
                size = stats.size,
                hits = stats.hits,
                misses = stats.misses,
                evictions = stats.evictions,
                hit_rate = stats.hit_rate(),
                "Client cache at capacity"
            );
        }

        self.cache.insert(
            client.bearer_key.clone(),
            CachedEntry {
                client: client.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, bearer_key: &str) -> Result<(), CacheError> {
        self.cache.remove(bearer_key);
        Ok(())
    }
}
