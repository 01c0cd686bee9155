//! In-memory result caching
//!
//! Remote commands are slow (a cable test takes seconds) and their results
//! change slowly, so parsed results are kept for a short, per-category time.
//! Values that look like a failure (empty listings, error records, MAC
//! misses) are never stored, so the next request goes back to the device.
//!
//! There is no per-key locking: two concurrent misses on the same key both do
//! the remote work and both store the result.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// Implemented by everything that goes into a [`ResultCache`].
pub trait Cacheable: Clone {
    /// `false` for empty or error-valued results
    fn is_cacheable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    Interfaces,
    Mac,
    Tdr,
}

impl CacheCategory {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheCategory::Interfaces => "iflist",
            CacheCategory::Mac => "mac",
            CacheCategory::Tdr => "tdr",
        }
    }
}

/// Category plus ordered string parts. Compared exactly; callers normalize
/// inputs such as MAC addresses before building a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    category: CacheCategory,
    parts: Vec<String>,
}

impl CacheKey {
    pub fn new<I, S>(category: CacheCategory, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category,
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.category.prefix(), self.parts.join("|"))
    }
}

/// A cached value with the time it was stored
#[derive(Debug, Clone)]
pub struct CachedEntry<V> {
    pub value: V,
    pub timestamp: DateTime<Utc>,
}

impl<V> CachedEntry<V> {
    pub fn new(value: V) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
        }
    }

    /// Check if this entry is younger than `ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => Utc::now() - self.timestamp < ttl,
            // a TTL too large for chrono never expires
            Err(_) => true,
        }
    }
}

/// Time-bound store for one result category.
pub struct ResultCache<V> {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, CachedEntry<V>>>,
}

impl<V: Cacheable> ResultCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CachedEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a fresh value. Expired entries are evicted on the way.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl) => {
                trace!("Cache hit for {}", key);
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!("Cache entry {} expired", key);
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` unless it reports itself as empty or an error.
    /// Returns whether the value was stored.
    pub fn insert(&self, key: CacheKey, value: V) -> bool {
        if !value.is_cacheable() {
            debug!("Not caching empty or error result for {}", key);
            return false;
        }

        let mut entries = self.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.is_fresh(ttl));
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.timestamp)
                .map(|(k, _)| k.clone());
            if entries.len() >= self.capacity
                && let Some(oldest) = oldest
            {
                trace!("Cache full, evicting {}", oldest);
                entries.remove(&oldest);
            }
        }

        trace!("Caching {}", key);
        entries.insert(key, CachedEntry::new(value));
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
