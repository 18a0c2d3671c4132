//! Two-level cache: memory LRU in front of an optional disk tier.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::CacheConfig;
use super::disk::{DiskTier, Verdict};
use super::entry::CacheEntry;
use super::key::CacheKey;
use super::memory::{Lookup, MemoryTier};
use crate::telemetry;
use crate::types::Payload;
use crate::{Result, TollgateError};

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
    corrupt: AtomicU64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub corrupt: u64,
    pub memory_entries: usize,
    pub memory_bytes: usize,
    pub max_memory_entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from either tier; `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// What [`TieredCache::cleanup_expired`] removed.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CleanupReport {
    pub memory_expired: usize,
    pub disk_expired: usize,
    pub disk_corrupt: usize,
    /// Valid entries left on disk.
    pub disk_remaining: usize,
    /// Disk entries that could not be read or deleted and were skipped.
    pub disk_failed: usize,
}

/// Memory LRU backed by an optional directory of entry files.
///
/// Lookups go memory first, then disk; disk hits are promoted into memory.
/// Writes go to memory immediately and to disk before `put` returns.
#[derive(Debug)]
pub struct TieredCache {
    memory: MemoryTier,
    disk: Option<DiskTier>,
    default_ttl: Duration,
    require_durable: bool,
    counters: Counters,
}

impl TieredCache {
    /// Create a cache from configuration, creating the disk directory if one
    /// is configured.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_memory_entries).ok_or_else(|| {
            TollgateError::Configuration("max_memory_entries must be at least 1".into())
        })?;
        let disk = config.disk_dir.as_ref().map(DiskTier::open).transpose()?;
        if let Some(disk) = &disk {
            info!(dir = %disk.dir().display(), "disk cache enabled");
        }
        Ok(Self {
            memory: MemoryTier::new(capacity),
            disk,
            default_ttl: config.ttl,
            require_durable: config.require_durable,
            counters: Counters::default(),
        })
    }

    /// TTL used when the caller does not give one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Whether a failed disk write must fail the request that produced it.
    pub fn require_durable(&self) -> bool {
        self.require_durable
    }

    /// Disk tier directory, if the disk tier is enabled.
    pub fn disk_dir(&self) -> Option<&Path> {
        self.disk.as_ref().map(DiskTier::dir)
    }

    /// Look up `key`. `Some` is a hit.
    ///
    /// Expired entries are removed from whichever tier held them and count
    /// as misses, as do corrupt disk entries (which are deleted). A lookup
    /// counts at most one expiry.
    pub async fn get(&self, key: &CacheKey) -> Option<Payload> {
        let now = SystemTime::now();
        let memory_expired = match self.memory.get(key, now) {
            Lookup::Hit(payload) => {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "memory").increment(1);
                debug!(key = key.short(), "memory cache hit");
                return Some(payload);
            }
            Lookup::Expired => {
                self.record_expired("memory");
                true
            }
            Lookup::Miss => false,
        };

        if let Some(payload) = self.get_from_disk(key, now, memory_expired).await {
            return Some(payload);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        None
    }

    async fn get_from_disk(
        &self,
        key: &CacheKey,
        now: SystemTime,
        expiry_counted: bool,
    ) -> Option<Payload> {
        let disk = self.disk.as_ref()?;
        match disk.load(key).await {
            Ok(Some(entry)) if !entry.is_expired(now) => {
                let payload = entry.payload.clone();
                let (_, evicted) = self.memory.promote(key.clone(), entry);
                self.record_eviction(evicted);
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "disk").increment(1);
                debug!(key = key.short(), "disk cache hit, promoted to memory");
                Some(payload)
            }
            Ok(Some(_)) => {
                if !expiry_counted {
                    self.record_expired("disk");
                }
                self.discard_stale(disk, key, now).await;
                None
            }
            Ok(None) => None,
            Err(e @ TollgateError::CacheCorruption { .. }) => {
                warn!(key = key.short(), error = %e, "discarding corrupt cache entry");
                self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_CORRUPT_TOTAL).increment(1);
                self.discard_stale(disk, key, now).await;
                None
            }
            Err(e) => {
                warn!(key = key.short(), error = %e, "failed to read disk cache");
                None
            }
        }
    }

    // The file may have been replaced since it was read; only a still-stale
    // entry is deleted.
    async fn discard_stale(&self, disk: &DiskTier, key: &CacheKey, now: SystemTime) {
        match disk.remove_stale(key, now).await {
            Ok(Verdict::Fresh) => debug!(key = key.short(), "disk entry replaced, kept"),
            Ok(_) => {}
            Err(e) => warn!(key = key.short(), error = %e, "failed to remove stale cache entry"),
        }
    }

    /// Store `payload` under `key` for `ttl`.
    ///
    /// The memory tier is updated first and unconditionally. The disk write
    /// completes before this returns; its failure is returned as an error
    /// while the memory copy stays in place. A zero `ttl` stores nothing.
    pub async fn put(&self, key: &CacheKey, payload: Payload, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            debug!(key = key.short(), "zero ttl, not caching");
            return Ok(());
        }
        let entry = CacheEntry::new(payload, ttl);
        if let Some(disk) = &self.disk {
            let evicted = self.memory.insert(key.clone(), entry.clone());
            self.record_eviction(evicted);
            disk.store(key, &entry).await?;
        } else {
            let evicted = self.memory.insert(key.clone(), entry);
            self.record_eviction(evicted);
        }
        debug!(key = key.short(), ttl_secs = ttl.as_secs_f64(), "cache put");
        Ok(())
    }

    /// Remove `key` from both tiers.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<()> {
        self.memory.remove(key);
        if let Some(disk) = &self.disk {
            disk.remove(key).await?;
        }
        debug!(key = key.short(), "cache entry invalidated");
        Ok(())
    }

    /// Empty both tiers.
    pub async fn clear(&self) -> Result<()> {
        self.memory.clear();
        let removed = match &self.disk {
            Some(disk) => disk.clear().await?,
            None => 0,
        };
        info!(disk_removed = removed, "cache cleared");
        Ok(())
    }

    /// Sweep both tiers for expired entries (and corrupt disk entries).
    pub async fn cleanup_expired(&self) -> Result<CleanupReport> {
        let now = SystemTime::now();
        let mut report = CleanupReport {
            memory_expired: self.memory.purge_expired(now),
            ..CleanupReport::default()
        };
        if let Some(disk) = &self.disk {
            let sweep = disk.sweep(now).await?;
            report.disk_expired = sweep.expired;
            report.disk_corrupt = sweep.corrupt;
            report.disk_remaining = sweep.remaining;
            report.disk_failed = sweep.failed;
        }

        let expired = (report.memory_expired + report.disk_expired) as u64;
        self.counters.expired.fetch_add(expired, Ordering::Relaxed);
        self.counters
            .corrupt
            .fetch_add(report.disk_corrupt as u64, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_EXPIRED_TOTAL, "tier" => "memory")
            .increment(report.memory_expired as u64);
        metrics::counter!(telemetry::CACHE_EXPIRED_TOTAL, "tier" => "disk")
            .increment(report.disk_expired as u64);
        metrics::counter!(telemetry::CACHE_CORRUPT_TOTAL).increment(report.disk_corrupt as u64);

        info!(
            memory_expired = report.memory_expired,
            disk_expired = report.disk_expired,
            disk_corrupt = report.disk_corrupt,
            disk_failed = report.disk_failed,
            "cleaned up expired cache entries"
        );
        Ok(report)
    }

    /// Number of entry files in the disk tier (0 when disabled).
    pub async fn disk_entries(&self) -> Result<usize> {
        match &self.disk {
            Some(disk) => disk.count().await,
            None => Ok(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let memory_hits = self.counters.memory_hits.load(Ordering::Relaxed);
        let disk_hits = self.counters.disk_hits.load(Ordering::Relaxed);
        CacheStats {
            hits: memory_hits + disk_hits,
            memory_hits,
            disk_hits,
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            corrupt: self.counters.corrupt.load(Ordering::Relaxed),
            memory_entries: self.memory.len(),
            memory_bytes: self.memory.bytes(),
            max_memory_entries: self.memory.capacity(),
        }
    }

    fn record_eviction(&self, evicted: Option<CacheKey>) {
        if let Some(key) = evicted {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
            debug!(key = key.short(), "evicted from memory cache");
        }
    }

    fn record_expired(&self, tier: &'static str) {
        self.counters.expired.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_EXPIRED_TOTAL, "tier" => tier).increment(1);
    }
}
