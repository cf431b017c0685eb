//! Property-Based Tests for Part Records
//!
//! For any assembled part:
//! - a stored record reads back equal, failed facets included
//! - every facet keeps its state through storage
//! - the record key is derived from the part id alone

use std::sync::Arc;
use std::time::Duration;

use catalog_core::{FacetKind, Part};
use catalog_storage::{CacheAside, CacheKey, CacheableEntity, InMemoryCacheStore, WriteBackTasks};
use catalog_test_utils::generators::{arb_complete_part, arb_part};
use proptest::prelude::*;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn part_cache() -> CacheAside<Part> {
    let store = Arc::new(InMemoryCacheStore::new());
    CacheAside::new(store, WriteBackTasks::new(), Duration::from_secs(60))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_stored_part_reads_back_equal(part in arb_part()) {
        let rt = test_runtime()?;
        let cache = part_cache();
        let read = rt.block_on(async {
            cache.put(&part).await?;
            Ok::<_, catalog_core::CatalogError>(cache.lookup(&part.cache_key()).await)
        });
        let read = read.map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(read, Some(part));
    }

    #[test]
    fn prop_failed_facets_survive_storage(part in arb_part()) {
        let rt = test_runtime()?;
        let cache = part_cache();
        let read = rt
            .block_on(async {
                cache.put(&part).await?;
                Ok::<_, catalog_core::CatalogError>(cache.lookup(&part.cache_key()).await)
            })
            .map_err(|e| TestCaseError::fail(e.to_string()))?
            .ok_or_else(|| TestCaseError::fail("record missing"))?;
        for kind in FacetKind::PART_FACETS {
            prop_assert_eq!(read.facet_state(kind), part.facet_state(kind));
        }
    }

    #[test]
    fn prop_complete_part_key_matches_id(part in arb_complete_part()) {
        prop_assert!(part.is_fully_assembled());
        prop_assert_eq!(part.cache_key(), CacheKey::part(part.part_id));
        prop_assert_eq!(part.cache_key().encode(), format!("part:{}", part.part_id));
    }
}
