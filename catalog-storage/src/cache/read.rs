//! Results of cache-aside reads.

use catalog_core::AggregateError;
use chrono::{DateTime, Utc};

/// Where the value of a read came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from the cache store.
    Cache,
    /// Assembled from the source of truth after a miss.
    Source,
}

/// A record produced by an [`super::EntitySource`], together with the
/// per-facet failures of the pass that produced it.
#[derive(Debug, Clone)]
pub struct Assembled<T> {
    pub value: T,
    pub failures: AggregateError,
}

impl<T> Assembled<T> {
    /// A record produced without any failures.
    pub fn complete(value: T) -> Self {
        Self {
            value,
            failures: AggregateError::new(),
        }
    }

    pub fn partial(value: T, failures: AggregateError) -> Self {
        Self { value, failures }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of a cache-aside read.
///
/// Cache hits never carry failures: only complete records are written back.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    source: ReadSource,
    read_at: DateTime<Utc>,
    failures: AggregateError,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Cache,
            read_at: Utc::now(),
            failures: AggregateError::new(),
        }
    }

    pub fn from_source(assembled: Assembled<T>) -> Self {
        Self {
            value: assembled.value,
            source: ReadSource::Source,
            read_at: Utc::now(),
            failures: assembled.failures,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// The value and the failures of the pass that produced it, if any.
    pub fn into_parts(self) -> (T, Option<AggregateError>) {
        (self.value, self.failures.into_result())
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn read_at(&self) -> DateTime<Utc> {
        self.read_at
    }

    pub fn failures(&self) -> &AggregateError {
        &self.failures
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            source: self.source,
            read_at: self.read_at,
            failures: self.failures,
        }
    }
}
