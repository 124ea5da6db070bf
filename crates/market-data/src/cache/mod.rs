//! In-memory TTL cache.
//!
//! A single concurrent key/value store with per-entry expiry. Entries are
//! immutable once inserted; a `put` replaces the whole entry. Expiry is lazy
//! for reads: [`TtlCache::get`] hands back expired entries so callers can
//! use them as a last-known seed, but [`CacheEntry::is_fresh`] is the only
//! freshness test and never extends an entry's lifetime.
//!
//! Expired entries are physically removed by [`TtlCache::sweep`], usually
//! driven by the background task in [`sweeper`].

mod sweeper;

pub use sweeper::{spawn_sweeper, SweeperHandle};

use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use tokio::time::Instant;

/// A cached value and its freshness window.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Time since insertion.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.inserted_at)
    }

    /// Expired when `now - inserted_at > ttl`.
    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }

    pub fn is_fresh(&self) -> bool {
        !self.is_expired()
    }
}

/// Thread-safe key/value store with per-entry expiry.
///
/// `get` never blocks on other readers and never fails; absence is `None`.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the entry for `key`, expired or not.
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the value for `key` only if its entry is still fresh.
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        self.get(key)
            .filter(CacheEntry::is_fresh)
            .map(|entry| entry.value)
    }

    /// Insert or replace the entry for `key`.
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove the entry for `key`. Returns true if one existed.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Cache sweep removed {} expired entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Object-safe view of a cache for the background sweeper.
pub trait Sweep: Send + Sync {
    fn sweep(&self) -> usize;
}

impl<K, V> Sweep for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn sweep(&self) -> usize {
        TtlCache::sweep(self)
    }
}
