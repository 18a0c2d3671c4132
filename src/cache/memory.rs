//! Memory tier: strict LRU bounded by entry count.

use std::num::NonZeroUsize;
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::Mutex;

use super::entry::CacheEntry;
use super::key::CacheKey;
use crate::types::Payload;

/// Result of a memory lookup.
pub(crate) enum Lookup {
    Hit(Payload),
    /// Present but past its TTL; already removed.
    Expired,
    Miss,
}

#[derive(Debug)]
struct Inner {
    lru: LruCache<CacheKey, CacheEntry>,
    bytes: usize,
}

impl Inner {
    fn insert(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheKey> {
        self.bytes += entry.size_hint();
        match self.lru.push(key.clone(), entry) {
            Some((old_key, old)) => {
                self.bytes = self.bytes.saturating_sub(old.size_hint());
                // push hands back the previous value for the same key, or
                // the evicted LRU entry when the cache was full
                (old_key != key).then_some(old_key)
            }
            None => None,
        }
    }
}

/// The hot tier. One lock guards the LRU list and the byte count.
#[derive(Debug)]
pub(crate) struct MemoryTier {
    inner: Mutex<Inner>,
}

impl MemoryTier {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(capacity),
                bytes: 0,
            }),
        }
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub fn get(&self, key: &CacheKey, now: SystemTime) -> Lookup {
        let mut inner = self.inner.lock();
        match inner.lru.get(key) {
            None => return Lookup::Miss,
            Some(entry) if !entry.is_expired(now) => return Lookup::Hit(entry.payload.clone()),
            Some(_) => {}
        }
        if let Some(old) = inner.lru.pop(key) {
            inner.bytes = inner.bytes.saturating_sub(old.size_hint());
        }
        Lookup::Expired
    }

    /// Insert or replace `key`. Returns the key evicted to make room, if any.
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) -> Option<CacheKey> {
        self.inner.lock().insert(key, entry)
    }

    /// Insert `key` only if it is not already present.
    ///
    /// Used when promoting from disk so that a newer value written by a
    /// concurrent `put` is never replaced by the older disk copy. Returns
    /// `(inserted, evicted)`.
    pub fn promote(&self, key: CacheKey, entry: CacheEntry) -> (bool, Option<CacheKey>) {
        let mut inner = self.inner.lock();
        if inner.lru.contains(&key) {
            return (false, None);
        }
        let evicted = inner.insert(key, entry);
        (true, evicted)
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock();
        match inner.lru.pop(key) {
            Some(old) => {
                inner.bytes = inner.bytes.saturating_sub(old.size_hint());
                true
            }
            None => false,
        }
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .lru
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            if let Some(old) = inner.lru.pop(key) {
                inner.bytes = inner.bytes.saturating_sub(old.size_hint());
            }
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn bytes(&self) -> usize {
        self.inner.lock().bytes
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().lru.cap().get()
    }
}
