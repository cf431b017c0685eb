//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped,
//! persistent byte store that survives process restarts.
//!
//! # Value Format
//!
//! Every value is stored as `[expires_at: 8 bytes LE millis][payload]`.
//! Expiry is evaluated lazily: an expired key reads as a miss and is removed
//! in the same call.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{CacheError, CatalogResult};
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::key::CacheKey;
use super::traits::{CacheStats, CacheStore};

const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value is shorter than its header.
    #[error("Corrupt value under {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for catalog_core::CatalogError {
    fn from(e: LmdbCacheError) -> Self {
        catalog_core::CatalogError::Cache(CacheError::Backend {
            reason: e.to_string(),
        })
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Persistent [`CacheStore`] backed by a single unnamed LMDB database.
///
/// # Example
///
/// ```ignore
/// use catalog_storage::cache::{CacheKey, CacheStore, LmdbCacheStore};
///
/// let store = LmdbCacheStore::new("/var/cache/catalog", 256)?;
/// store.set(&CacheKey::part(PartId::new(11000)), &bytes, ttl).await?;
/// ```
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: RwLock<CacheStats>,
}

impl LmdbCacheStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_size_mb` does not fit in the address space as bytes
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        let map_size = Self::map_size(max_size_mb)?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per store and the directory
        // is owned by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB cache store");

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Map size in bytes for a limit given in megabytes.
    fn map_size(max_size_mb: usize) -> Result<usize, LmdbCacheError> {
        max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| LmdbCacheError::EnvOpen(format!("map size of {max_size_mb} MB overflows")))
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn deadline(ttl: Duration) -> i64 {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self::now_millis().saturating_add(ttl_ms)
    }

    fn frame(expires_at: i64, payload: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(HEADER_LEN + payload.len());
        full.extend_from_slice(&expires_at.to_le_bytes());
        full.extend_from_slice(payload);
        full
    }

    /// Split a stored value into its deadline and payload.
    fn unframe<'a>(key: &CacheKey, bytes: &'a [u8]) -> Result<(i64, &'a [u8]), LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Corrupt(key.encode()));
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);
        let header: [u8; HEADER_LEN] = header
            .try_into()
            .map_err(|_| LmdbCacheError::Corrupt(key.encode()))?;
        Ok((i64::from_le_bytes(header), payload))
    }

    fn remove(&self, encoded: &[u8]) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self.db.delete(&mut wtxn, encoded).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn with_stats(&self, f: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, key: &CacheKey) -> CatalogResult<Option<Vec<u8>>> {
        let encoded = key.encode();

        let lookup = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.db.get(&rtxn, encoded.as_bytes()).map_err(txn_err)? {
                Some(bytes) => {
                    let (expires_at, payload) = Self::unframe(key, bytes)?;
                    Some((expires_at, payload.to_vec()))
                }
                None => None,
            }
        };

        match lookup {
            Some((expires_at, payload)) if expires_at > Self::now_millis() => {
                self.with_stats(|s| s.hits += 1);
                Ok(Some(payload))
            }
            Some(_) => {
                if self.remove(encoded.as_bytes())? {
                    self.with_stats(|s| s.evictions += 1);
                }
                self.with_stats(|s| s.misses += 1);
                Ok(None)
            }
            None => {
                self.with_stats(|s| s.misses += 1);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> CatalogResult<()> {
        let encoded = key.encode();
        if ttl.is_zero() {
            self.remove(encoded.as_bytes())?;
            return Ok(());
        }

        let full = Self::frame(Self::deadline(ttl), value);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, encoded.as_bytes(), &full)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn expire(&self, key: &CacheKey, ttl: Duration) -> CatalogResult<bool> {
        let encoded = key.encode();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let payload = match self.db.get(&wtxn, encoded.as_bytes()).map_err(txn_err)? {
            Some(bytes) => {
                let (expires_at, payload) = Self::unframe(key, bytes)?;
                (expires_at > Self::now_millis()).then(|| payload.to_vec())
            }
            None => return Ok(false),
        };

        let Some(payload) = payload else {
            self.db
                .delete(&mut wtxn, encoded.as_bytes())
                .map_err(txn_err)?;
            wtxn.commit().map_err(txn_err)?;
            return Ok(false);
        };

        if ttl.is_zero() {
            self.db
                .delete(&mut wtxn, encoded.as_bytes())
                .map_err(txn_err)?;
        } else {
            let full = Self::frame(Self::deadline(ttl), &payload);
            self.db
                .put(&mut wtxn, encoded.as_bytes(), &full)
                .map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(true)
    }

    async fn delete(&self, key: &CacheKey) -> CatalogResult<bool> {
        Ok(self.remove(key.encode().as_bytes())?)
    }

    async fn stats(&self) -> CatalogResult<CacheStats> {
        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();

        let now = Self::now_millis();
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let iter = self.db.iter(&rtxn).map_err(txn_err)?;
        for (_, bytes) in iter.flatten() {
            if bytes.len() < HEADER_LEN {
                continue;
            }
            let mut header = [0u8; HEADER_LEN];
            header.copy_from_slice(&bytes[..HEADER_LEN]);
            if i64::from_le_bytes(header) > now {
                stats.entry_count += 1;
                stats.memory_bytes += (bytes.len() - HEADER_LEN) as u64;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{PartId, PriceId};
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbCacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbCacheStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let (store, _dir) = create_test_store();
        let key = CacheKey::part(PartId::new(11000));

        assert!(store.get(&key).await.unwrap().is_none());
        store.set(&key, b"{\"part_id\":11000}", Duration::from_secs(60)).await.unwrap();
        assert_eq!(
            store.get(&key).await.unwrap().as_deref(),
            Some(&b"{\"part_id\":11000}"[..])
        );

        assert!(store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entry_count, 0);
    }

    #[tokio::test]
    async fn test_expired_value_is_a_miss() {
        let (store, _dir) = create_test_store();
        let key = CacheKey::price(PriceId::new(9));
        store.set(&key, b"x", Duration::from_millis(20)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!store.delete(&key).await.unwrap());
        assert_eq!(store.stats().await.unwrap().evictions, 1);
    }

    #[tokio::test]
    async fn test_expire_rewrites_deadline() {
        let (store, _dir) = create_test_store();
        let key = CacheKey::part(PartId::new(1));
        store.set(&key, b"payload", Duration::from_millis(30)).await.unwrap();
        assert!(store.expire(&key, Duration::from_secs(60)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"payload"[..]));

        assert!(store.expire(&key, Duration::ZERO).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!store.expire(&key, Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let key = CacheKey::part_facet(PartId::new(11000), catalog_core::FacetKind::Pricing);
        {
            let store = LmdbCacheStore::new(temp_dir.path(), 10).unwrap();
            store.set(&key, b"[]", Duration::from_secs(60)).await.unwrap();
        }
        let store = LmdbCacheStore::new(temp_dir.path(), 10).unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"[]"[..]));
    }

    #[test]
    fn test_oversized_map_is_rejected() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let result = LmdbCacheStore::new(temp_dir.path().join("huge"), usize::MAX);
        assert!(matches!(result, Err(LmdbCacheError::EnvOpen(_))));
        assert!(!temp_dir.path().join("huge").exists());
        assert_eq!(LmdbCacheStore::map_size(10).unwrap(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_unframe_rejects_short_values() {
        let key = CacheKey::part(PartId::new(1));
        assert!(matches!(
            LmdbCacheStore::unframe(&key, &[1, 2, 3]),
            Err(LmdbCacheError::Corrupt(_))
        ));
        let framed = LmdbCacheStore::frame(42, b"abc");
        let (deadline, payload) = LmdbCacheStore::unframe(&key, &framed).unwrap();
        assert_eq!(deadline, 42);
        assert_eq!(payload, b"abc");
    }
}
