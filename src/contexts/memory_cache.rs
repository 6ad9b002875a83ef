use crate::data::Cache;
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default lifetime of a cached analysis
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// A stored value and the moment it was stored
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// MemoryCache is an implementation of the Cache trait that keeps values in
/// process memory for a fixed time-to-live.
///
/// An entry is live while `now - stored_at < ttl`. Expired entries are never
/// returned; they are dropped lazily on lookup or by `purge_expired`.
/// With a capacity set, inserting a new key into a full cache evicts expired
/// entries first and then the entry with the oldest `stored_at`.
#[derive(Debug)]
pub struct MemoryCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: Option<usize>,
}

impl<V: Clone> MemoryCache<V> {
    /// Creates a new MemoryCache
    ///
    /// # Arguments
    /// * `ttl` - How long an entry stays servable after `set`
    /// * `max_entries` - Optional capacity bound. None means unbounded
    pub fn new(ttl: Duration, max_entries: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.filter(|max| *max > 0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Physically removes every expired entry and returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| self.is_live(entry, now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn is_live(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) < self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes room for one new key. Oldest `stored_at` goes first, ties broken
    /// by key so the choice is deterministic.
    fn evict_for_insert(&self, entries: &mut HashMap<String, CacheEntry<V>>, now: Instant) {
        let Some(max) = self.max_entries else {
            return;
        };
        if entries.len() < max {
            return;
        }

        entries.retain(|_, entry| self.is_live(entry, now));

        while entries.len() >= max {
            let oldest = entries
                .iter()
                .min_by(|(ka, a), (kb, b)| a.stored_at.cmp(&b.stored_at).then_with(|| ka.cmp(kb)))
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!("cache full, evicting {}", key);
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl<V: Clone> Cache for MemoryCache<V> {
    type Value = V;

    /// Retrieves a cached value for the given key
    ///
    /// # Returns
    /// * `Some(V)` - A clone of the stored value if it has not expired
    /// * `None` - If the key was never set or its entry has expired
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();

        let live = self.is_live(entries.get(key)?, now);
        if live {
            entries.get(key).map(|entry| entry.value.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    /// Stores a value in the cache for the given key
    ///
    /// Overwrites any existing entry and restarts its lifetime.
    fn set(&self, key: &str, value: V) {
        let now = Instant::now();
        let mut entries = self.lock();

        if !entries.contains_key(key) {
            self.evict_for_insert(&mut entries, now);
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }
}

impl<V: Clone> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, None)
    }
}
