//! Shared engine harness for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use catalog_api::{CatalogEngine, Collaborators};
use catalog_core::CatalogConfig;
use catalog_storage::{CacheStore, InMemoryCacheStore};
use catalog_test_utils::{fixtures, MockCustomerProvider, ScriptedDataSource};

pub struct Harness {
    pub engine: CatalogEngine,
    pub source: ScriptedDataSource,
    pub customers: Arc<MockCustomerProvider>,
    pub store: Arc<InMemoryCacheStore>,
}

/// Engine over the seeded catalog, two known callers and an in-memory cache.
pub fn harness() -> Harness {
    harness_with(fixtures::fast_config())
}

pub fn harness_with(config: CatalogConfig) -> Harness {
    let store = Arc::new(InMemoryCacheStore::new());
    let (engine, source, customers) = engine_over(config, store.clone());
    Harness {
        engine,
        source,
        customers,
        store,
    }
}

/// Engine over the seeded catalog with a caller-supplied cache store.
pub fn engine_over(
    config: CatalogConfig,
    store: Arc<dyn CacheStore>,
) -> (CatalogEngine, ScriptedDataSource, Arc<MockCustomerProvider>) {
    let source = ScriptedDataSource::new(fixtures::seeded_catalog());
    let customers = Arc::new(fixtures::two_callers());
    let parts = Collaborators::in_memory(Arc::new(source.catalog().clone()), customers.clone())
        .with_source(Arc::new(source.clone()))
        .with_cache(store);
    let engine = CatalogEngine::new(config, parts).expect("engine should build");
    (engine, source, customers)
}
