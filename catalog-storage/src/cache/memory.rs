//! Process-local cache store.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{CacheError, CatalogResult};
use tokio::time::Instant;

use super::key::CacheKey;
use super::traits::{CacheStats, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// [`CacheStore`] over a locked map. Expired entries are dropped lazily on
/// access. Time follows the tokio clock, so paused-time tests can step
/// through expiry.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    stats: RwLock<CacheStats>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` holds a live value, without touching hit/miss counters.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.get(key).is_some_and(|e| e.is_live(now)))
            .unwrap_or(false)
    }

    /// Number of stored entries, expired ones not yet dropped included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> CacheError {
        CacheError::Backend {
            reason: "cache lock poisoned".to_string(),
        }
    }

    fn record(&self, hit: bool) {
        if let Ok(mut stats) = self.stats.write() {
            if hit {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
    }

    fn record_eviction(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.evictions += 1;
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> CatalogResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let found = {
            let entries = self.entries.read().map_err(|_| Self::poisoned())?;
            entries.get(key).cloned()
        };

        match found {
            Some(entry) if entry.is_live(now) => {
                self.record(true);
                Ok(Some(entry.bytes))
            }
            Some(_) => {
                let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
                // Re-check under the write lock, a concurrent set may have refreshed it.
                if entries.get(key).is_some_and(|e| !e.is_live(now)) {
                    entries.remove(key);
                    self.record_eviction();
                }
                self.record(false);
                Ok(None)
            }
            None => {
                self.record(false);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> CatalogResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        if ttl.is_zero() {
            entries.remove(key);
            return Ok(());
        }
        entries.insert(
            *key,
            Entry {
                bytes: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &CacheKey, ttl: Duration) -> CatalogResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        match entries.get(key).map(|e| e.is_live(now)) {
            Some(true) if ttl.is_zero() => {
                entries.remove(key);
                Ok(true)
            }
            Some(true) => {
                if let Some(entry) = entries.get_mut(key) {
                    entry.expires_at = now + ttl;
                }
                Ok(true)
            }
            Some(false) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &CacheKey) -> CatalogResult<bool> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        Ok(entries.remove(key).is_some())
    }

    async fn stats(&self) -> CatalogResult<CacheStats> {
        let now = Instant::now();
        let mut stats = self.stats.read().map_err(|_| Self::poisoned())?.clone();
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        let live = entries.values().filter(|e| e.is_live(now));
        let (count, bytes) = live.fold((0u64, 0u64), |(n, b), e| (n + 1, b + e.bytes.len() as u64));
        stats.entry_count = count;
        stats.memory_bytes = bytes;
        Ok(stats)
    }
}
