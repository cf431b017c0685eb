//! Cache layer for assembled catalog records.
//!
//! Byte stores ([`InMemoryCacheStore`], [`LmdbCacheStore`]) sit behind the
//! [`CacheStore`] trait. [`CacheAside`] layers typed cache-aside reads on
//! top, with write-backs owned by a [`WriteBackTasks`] group so that no
//! background write outlives shutdown unobserved.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheAside::<Part>::new(store, tasks.clone(), config.part_ttl);
//! let read = cache.get(PartId::new(11000), &coordinator).await?;
//! if read.was_cache_hit() {
//!     tracing::trace!("served from cache");
//! }
//! ```

pub mod cache_aside;
pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod read;
pub mod traits;
pub mod write_back;

pub use cache_aside::{CacheAside, EntitySource};
pub use key::CacheKey;
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use read::{Assembled, CacheRead, ReadSource};
pub use traits::{decode_record, encode_record, CacheStats, CacheStore, CacheableEntity};
pub use write_back::{Generation, WriteBackTasks};
