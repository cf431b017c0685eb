//! Cache store trait and cacheable entity marker.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{CacheError, CatalogResult, EntityKind, Part, PartId, Price, PriceId};
use serde::{de::DeserializeOwned, Serialize};

use super::key::CacheKey;

/// Marker trait for records that can be cached whole.
///
/// # Implementation Requirements
///
/// - `entity_kind()` must return the same value for all instances
/// - `entity_id()` must return the id the record is looked up by
pub trait CacheableEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Typed id the record is addressed by.
    type Id: Copy + Into<i64> + fmt::Display + Send + Sync + 'static;

    fn entity_kind() -> EntityKind;

    fn entity_id(&self) -> Self::Id;

    fn cache_key_for(id: Self::Id) -> CacheKey {
        CacheKey::new(Self::entity_kind(), id.into())
    }

    fn cache_key(&self) -> CacheKey {
        Self::cache_key_for(self.entity_id())
    }
}

/// Byte-oriented key/value store with per-key TTL.
///
/// Values are opaque to the store; encoding lives with the caller. All
/// operations must be safe under concurrent use. A zero TTL removes the key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the value of a live key. Expired keys read as `None`.
    async fn get(&self, key: &CacheKey) -> CatalogResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> CatalogResult<()>;

    /// Reset the TTL of a live key. Returns `false` if the key is absent.
    async fn expire(&self, key: &CacheKey, ttl: Duration) -> CatalogResult<bool>;

    /// Remove a key. Returns `false` if it was already absent.
    async fn delete(&self, key: &CacheKey) -> CatalogResult<bool>;

    async fn stats(&self) -> CatalogResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired keys included.
    pub misses: u64,
    /// Number of live entries.
    pub entry_count: u64,
    /// Approximate payload size in bytes.
    pub memory_bytes: u64,
    /// Number of entries dropped on expiry.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// RECORD CODEC
// ============================================================================

/// Encode a record for storage under `key`.
pub fn encode_record<T: Serialize>(key: &CacheKey, value: &T) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(value).map_err(|e| CacheError::Encode {
        key: key.encode(),
        reason: e.to_string(),
    })
}

/// Decode a record read from `key`.
pub fn decode_record<T: DeserializeOwned>(key: &CacheKey, bytes: &[u8]) -> Result<T, CacheError> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Decode {
        key: key.encode(),
        reason: e.to_string(),
    })
}

// ============================================================================
// IMPLEMENTATIONS FOR CATALOG ENTITIES
// ============================================================================

impl CacheableEntity for Part {
    type Id = PartId;

    fn entity_kind() -> EntityKind {
        EntityKind::Part
    }

    fn entity_id(&self) -> PartId {
        self.part_id
    }
}

impl CacheableEntity for Price {
    type Id = PriceId;

    fn entity_kind() -> EntityKind {
        EntityKind::Price
    }

    fn entity_id(&self) -> PriceId {
        self.id
    }
}
