//! Short-lived TTL cache
//!
//! A key/value store where every entry carries an absolute expiration.
//! Expired entries are evicted lazily when a read observes them; there is no
//! background sweeper and nothing outlives the process.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

/// A cached value and the instant after which it is stale
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    expiration: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expiration
    }
}

/// Concurrent TTL cache safe to share between checks and services
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` until `now + ttl`, replacing any existing entry for `key`
    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expiration: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Look up a live entry.
    ///
    /// Returns `None` when the key is absent or expired. An expired entry is
    /// removed before returning.
    pub async fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(Instant::now()) => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Read guard is released; eviction needs the exclusive lock.
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            // A concurrent set() refreshed the entry between the two locks.
            Some(entry) if !entry.is_expired(Instant::now()) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!("Evicted expired cache entry");
                None
            }
            None => None,
        }
    }

    /// Return the cached value or fetch, store and return a fresh one.
    ///
    /// Fetch errors are returned as-is and nothing is cached for them.
    pub async fn get_or_try_insert_with<F, Fut>(&self, key: K, ttl: Duration, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        self.set(key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Drop an entry regardless of its expiration
    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
