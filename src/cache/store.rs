//! TTL- and size-bounded store of origin responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::validation::bounded;
use crate::config::{CacheConfig, EvictionStrategy};
use crate::http::response::EdgeResponse;
use crate::observability::metrics;

/// Eviction stops once the aggregate size is at or below this share of the cap.
const EVICTION_TARGET_RATIO: f64 = 0.8;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: EdgeResponse,
    size_bytes: u64,
    expires_at: Instant,
    inserted_seq: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    total_bytes: u64,
    next_seq: u64,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Cache of prior origin responses keyed by resource path.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    max_size_bytes: u64,
    strategy: EvictionStrategy,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    pub fn new(max_size_bytes: u64, strategy: EvictionStrategy) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_size_bytes,
            strategy,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size_bytes, config.eviction_strategy)
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<EdgeResponse> {
        self.get_at(key, Instant::now())
    }

    /// Return a live entry, deleting it if it has expired.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<EdgeResponse> {
        let mut inner = self.lock();
        let found = inner
            .entries
            .get(key)
            .map(|entry| (now < entry.expires_at).then(|| entry.payload.clone()));
        let live = match found {
            Some(Some(payload)) => Some(payload),
            Some(None) => {
                inner.remove(key);
                None
            }
            None => None,
        };
        drop(inner);

        if live.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_lookup(live.is_some());
        live
    }

    pub fn set(&self, key: &str, payload: EdgeResponse, ttl: Duration) {
        self.set_at(key, payload, ttl, Instant::now())
    }

    /// Store a response, then evict if the size cap is exceeded.
    pub fn set_at(&self, key: &str, payload: EdgeResponse, ttl: Duration, now: Instant) {
        let size_bytes = payload.encoded_len();
        let mut inner = self.lock();

        inner.remove(key);
        let inserted_seq = inner.next_seq;
        inner.next_seq += 1;
        inner.total_bytes += size_bytes;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                size_bytes,
                expires_at: now + bounded(ttl),
                inserted_seq,
            },
        );

        let evicted = self.evict(&mut inner);
        metrics::record_cache_size(inner.entries.len(), inner.total_bytes);
        drop(inner);

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            metrics::record_cache_evictions(evicted);
            tracing::debug!(key, evicted, "Cache evicted entries over size cap");
        }
    }

    fn evict(&self, inner: &mut CacheInner) -> usize {
        if self.max_size_bytes == 0 || inner.total_bytes <= self.max_size_bytes {
            return 0;
        }

        let mut order: Vec<(String, Instant, u64)> = inner
            .entries
            .iter()
            .map(|(key, e)| (key.clone(), e.expires_at, e.inserted_seq))
            .collect();
        match self.strategy {
            EvictionStrategy::ExpiryAscending => order.sort_by_key(|(_, expires_at, seq)| (*expires_at, *seq)),
            EvictionStrategy::InsertionOrder => order.sort_by_key(|(_, _, seq)| *seq),
        }

        let target = (self.max_size_bytes as f64 * EVICTION_TARGET_RATIO) as u64;
        let mut evicted = 0;
        for (key, _, _) in order {
            if inner.total_bytes <= target {
                break;
            }
            inner.remove(&key);
            evicted += 1;
        }
        evicted
    }

    /// Remove one entry, or every entry when `key` is `None`. Returns how many were removed.
    pub fn purge(&self, key: Option<&str>) -> usize {
        let mut inner = self.lock();
        let removed = match key {
            Some(key) => usize::from(inner.remove(key).is_some()),
            None => {
                let count = inner.entries.len();
                inner.entries.clear();
                inner.total_bytes = 0;
                count
            }
        };
        metrics::record_cache_size(inner.entries.len(), inner.total_bytes);
        removed
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        metrics::record_cache_size(inner.entries.len(), inner.total_bytes);
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            total_bytes: inner.total_bytes,
            max_size_bytes: self.max_size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }
}
