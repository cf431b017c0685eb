//! Cache-aside reads over a [`CacheStore`].
//!
//! A read consults the store first. On a miss the record is produced by an
//! [`EntitySource`], returned to the caller immediately, and written back in
//! the background only if it was produced without failures and the key was
//! not invalidated while it was being produced. Cache faults on the read
//! path are logged and treated as misses.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::CatalogResult;

use super::key::CacheKey;
use super::read::{Assembled, CacheRead};
use super::traits::{decode_record, encode_record, CacheStore, CacheableEntity};
use super::write_back::{Generation, WriteBackTasks};

/// Producer of records on a cache miss.
#[async_trait]
pub trait EntitySource<T: CacheableEntity>: Send + Sync {
    /// Produce the record for `id`.
    ///
    /// Returns `CatalogError::NotFound` when the record does not exist.
    async fn load(&self, id: T::Id) -> CatalogResult<Assembled<T>>;
}

/// Cache-aside accessor for one record type.
pub struct CacheAside<T> {
    store: Arc<dyn CacheStore>,
    tasks: WriteBackTasks,
    ttl: Duration,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheAside<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tasks: self.tasks.clone(),
            ttl: self.ttl,
            _record: PhantomData,
        }
    }
}

impl<T: CacheableEntity> CacheAside<T> {
    pub fn new(store: Arc<dyn CacheStore>, tasks: WriteBackTasks, ttl: Duration) -> Self {
        Self {
            store,
            tasks,
            ttl,
            _record: PhantomData,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn tasks(&self) -> &WriteBackTasks {
        &self.tasks
    }

    /// Read `id`, falling back to `source` on a miss.
    pub async fn get<S>(&self, id: T::Id, source: &S) -> CatalogResult<CacheRead<T>>
    where
        S: EntitySource<T> + ?Sized,
    {
        let key = T::cache_key_for(id);
        if let Some(record) = self.lookup(&key).await {
            tracing::trace!(key = %key, "Cache hit");
            return Ok(CacheRead::from_cache(record));
        }

        let seen = self.tasks.generation(&key);
        let assembled = source.load(id).await?;
        if assembled.is_complete() {
            self.spawn_write_back(key, assembled.value.clone(), seen);
        } else {
            tracing::debug!(
                key = %key,
                failed = %assembled.failures,
                "Not caching partially assembled record"
            );
        }
        Ok(CacheRead::from_source(assembled))
    }

    /// Cached record under `key`, or `None` on a miss or any cache fault.
    pub async fn lookup(&self, key: &CacheKey) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };
        match decode_record(key, &bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache record");
                None
            }
        }
    }

    /// Write `record` with the default TTL, waiting for the store.
    pub async fn put(&self, record: &T) -> CatalogResult<()> {
        self.put_with_ttl(record, self.ttl).await
    }

    pub async fn put_with_ttl(&self, record: &T, ttl: Duration) -> CatalogResult<()> {
        let key = record.cache_key();
        let bytes = encode_record(&key, record)?;
        self.store.set(&key, &bytes, ttl).await
    }

    /// Remove the cached record for `id`.
    ///
    /// Write-backs of records loaded before this call will not land.
    pub async fn invalidate(&self, id: T::Id) -> CatalogResult<bool> {
        let key = T::cache_key_for(id);
        self.tasks.invalidated(&key);
        self.store.delete(&key).await
    }

    fn spawn_write_back(&self, key: CacheKey, record: T, seen: Generation) {
        let store = Arc::clone(&self.store);
        let tasks = self.tasks.clone();
        let ttl = self.ttl;
        self.tasks.spawn(async move {
            let bytes = match encode_record(&key, &record) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cache write-back encode failed");
                    return;
                }
            };
            if let Err(e) = tasks
                .store_if_current(store.as_ref(), &key, &bytes, ttl, seen)
                .await
            {
                tracing::warn!(key = %key, error = %e, "Cache write-back failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use catalog_core::{
        AggregateError, CacheError, CatalogError, FacetError, FacetKind, Part, PartId,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail_reviews: bool,
    }

    impl CountingSource {
        fn new(fail_reviews: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_reviews,
            }
        }
    }

    #[async_trait]
    impl EntitySource<Part> for CountingSource {
        async fn load(&self, id: PartId) -> CatalogResult<Assembled<Part>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id.get() == 99999 {
                return Err(CatalogError::part_not_found(id));
            }
            let part = Part::new(id);
            if self.fail_reviews {
                let mut failures = AggregateError::new();
                failures.record(FacetError::no_rows(FacetKind::Reviews, id));
                return Ok(Assembled::partial(part, failures));
            }
            Ok(Assembled::complete(part))
        }
    }

    /// Source that invalidates the record it is producing, as a concurrent
    /// mutation would.
    struct MutatedWhileLoading {
        cache: CacheAside<Part>,
    }

    #[async_trait]
    impl EntitySource<Part> for MutatedWhileLoading {
        async fn load(&self, id: PartId) -> CatalogResult<Assembled<Part>> {
            let part = Part::new(id);
            self.cache.invalidate(id).await?;
            Ok(Assembled::complete(part))
        }
    }

    /// Store whose reads and writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _: &CacheKey) -> CatalogResult<Option<Vec<u8>>> {
            Err(CacheError::Backend { reason: "down".into() }.into())
        }
        async fn set(&self, _: &CacheKey, _: &[u8], _: Duration) -> CatalogResult<()> {
            Err(CacheError::Backend { reason: "down".into() }.into())
        }
        async fn expire(&self, _: &CacheKey, _: Duration) -> CatalogResult<bool> {
            Ok(false)
        }
        async fn delete(&self, _: &CacheKey) -> CatalogResult<bool> {
            Ok(false)
        }
        async fn stats(&self) -> CatalogResult<crate::cache::CacheStats> {
            Ok(Default::default())
        }
    }

    fn cache_over(store: Arc<dyn CacheStore>) -> CacheAside<Part> {
        CacheAside::new(store, WriteBackTasks::new(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache_over(store.clone());
        let source = CountingSource::new(false);

        let first = cache.get(PartId::new(11000), &source).await.unwrap();
        assert!(!first.was_cache_hit());
        cache.tasks().flush().await;
        assert!(store.contains(&CacheKey::part(PartId::new(11000))));

        let second = cache.get(PartId::new(11000), &source).await.unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(second.value(), first.value());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_record_not_written_back() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache_over(store.clone());
        let source = CountingSource::new(true);

        let read = cache.get(PartId::new(7), &source).await.unwrap();
        assert!(read.is_partial());
        cache.tasks().flush().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_propagates_and_caches_nothing() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache_over(store.clone());

        let err = cache
            .get(PartId::new(99999), &CountingSource::new(false))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        cache.tasks().flush().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cache_faults_fall_through_to_source() {
        let cache = cache_over(Arc::new(BrokenStore));
        let source = CountingSource::new(false);

        let read = cache.get(PartId::new(1), &source).await.unwrap();
        assert!(!read.was_cache_hit());
        cache.tasks().flush().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_record_is_a_miss() {
        let store = Arc::new(InMemoryCacheStore::new());
        let key = CacheKey::part(PartId::new(3));
        store.set(&key, b"garbage", Duration::from_secs(60)).await.unwrap();

        let cache = cache_over(store);
        let read = cache.get(PartId::new(3), &CountingSource::new(false)).await.unwrap();
        assert!(!read.was_cache_hit());
    }

    #[tokio::test]
    async fn test_invalidate_forces_miss() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache_over(store);
        let source = CountingSource::new(false);

        cache.put(&Part::new(PartId::new(5))).await.unwrap();
        assert!(cache.get(PartId::new(5), &source).await.unwrap().was_cache_hit());

        assert!(cache.invalidate(PartId::new(5)).await.unwrap());
        assert!(!cache.get(PartId::new(5), &source).await.unwrap().was_cache_hit());
    }

    #[tokio::test]
    async fn test_record_invalidated_during_load_is_not_written_back() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache_over(store.clone());
        let source = MutatedWhileLoading {
            cache: cache.clone(),
        };

        let read = cache.get(PartId::new(11000), &source).await.unwrap();
        assert!(!read.was_cache_hit());
        cache.tasks().flush().await;
        assert!(!store.contains(&CacheKey::part(PartId::new(11000))));

        // The next load is not raced and gets cached.
        cache.get(PartId::new(11000), &CountingSource::new(false)).await.unwrap();
        cache.tasks().flush().await;
        assert!(store.contains(&CacheKey::part(PartId::new(11000))));
    }
}
