//! Integration tests for the mutation gateway
//!
//! Every write must leave no cached record that still reflects the data as
//! it was before the write.

use std::sync::Arc;
use std::time::Duration;

use catalog_api::{ApiConfig, Collaborators, CatalogEngine};
use catalog_core::{CatalogError, FacetKind, NewPrice, Price};
use catalog_storage::{CacheKey, InMemoryCatalog, Row};
use catalog_test_utils::fixtures::{self, caller, PART_11000};
use catalog_test_utils::FlakyCacheStore;
use tempfile::TempDir;

#[path = "support/engine.rs"]
mod engine_support;
use engine_support::{engine_over, harness};

fn jobber(price: f64) -> NewPrice {
    NewPrice {
        part_id: PART_11000,
        price_type: "Jobber".to_string(),
        price,
        enforced: false,
    }
}

#[tokio::test]
async fn test_invalidate_forces_reassembly() {
    let h = harness();
    let assembler = h.engine.assembler();
    assembler.get(PART_11000, &caller("alpha")).await.unwrap();
    h.engine.write_backs().flush().await;
    assert!(assembler.get(PART_11000, &caller("alpha")).await.unwrap().from_cache);

    h.engine.writer().invalidate_part(PART_11000).await.unwrap();
    assert!(!h.store.contains(&CacheKey::part(PART_11000)));
    assert!(!h.store.contains(&CacheKey::part_facet(PART_11000, FacetKind::Pricing)));

    let reread = assembler.get(PART_11000, &caller("alpha")).await.unwrap();
    assert!(!reread.from_cache);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_during_assembly_is_not_overwritten() {
    let h = harness();
    h.source.delay(FacetKind::Images, Duration::from_millis(100));
    let assembler = h.engine.assembler();
    let writer = h.engine.writer();

    let alpha = caller("alpha");
    let (read, created) = tokio::join!(assembler.get(PART_11000, &alpha), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.create_price(jobber(150.0)).await
    });
    // The read started before the new price existed.
    assert_eq!(read.unwrap().part.pricing.len(), 2);
    created.unwrap();

    h.engine.write_backs().flush().await;
    assert!(!h.store.contains(&CacheKey::part(PART_11000)));
    assert!(!h.store.contains(&CacheKey::part_facet(PART_11000, FacetKind::Pricing)));

    let reread = assembler.get(PART_11000, &caller("alpha")).await.unwrap();
    assert!(!reread.from_cache);
    let types: Vec<&str> = reread
        .part
        .pricing
        .items()
        .iter()
        .map(|p| p.price_type.as_str())
        .collect();
    assert_eq!(types, vec!["Jobber", "List", "Map"]);
}

#[tokio::test]
async fn test_created_price_is_visible_on_next_read() {
    let h = harness();
    let assembler = h.engine.assembler();
    assembler.get(PART_11000, &caller("alpha")).await.unwrap();
    h.engine.write_backs().flush().await;
    assert!(h.store.contains(&CacheKey::part_facet(PART_11000, FacetKind::Pricing)));

    let created = h.engine.writer().create_price(jobber(150.0)).await.unwrap();
    assert_eq!(created.part_id, PART_11000);

    let read = assembler.get(PART_11000, &caller("alpha")).await.unwrap();
    assert!(!read.from_cache);
    let types: Vec<&str> = read
        .part
        .pricing
        .items()
        .iter()
        .map(|p| p.price_type.as_str())
        .collect();
    assert_eq!(types, vec!["Jobber", "List", "Map"]);
}

#[tokio::test]
async fn test_updated_price_is_visible_through_both_caches() {
    let h = harness();
    let writer = h.engine.writer();
    let created = writer.create_price(jobber(150.0)).await.unwrap();

    // Warm the price record and the part record.
    writer.get_price(created.id).await.unwrap();
    h.engine.assembler().get(PART_11000, &caller("alpha")).await.unwrap();
    h.engine.write_backs().flush().await;
    assert!(h.store.contains(&CacheKey::price(created.id)));

    let updated = writer
        .update_price(Price {
            price: 120.0,
            ..created.clone()
        })
        .await
        .unwrap();
    assert_eq!(updated.price, 120.0);

    assert_eq!(writer.get_price(created.id).await.unwrap().price, 120.0);
    let read = h
        .engine
        .assembler()
        .get(PART_11000, &caller("alpha"))
        .await
        .unwrap();
    let jobber = read
        .part
        .pricing
        .items()
        .iter()
        .find(|p| p.price_type == "Jobber")
        .expect("jobber price should be listed");
    assert_eq!(jobber.price, 120.0);
}

#[tokio::test]
async fn test_deleted_price_disappears() {
    let h = harness();
    let writer = h.engine.writer();
    let created = writer.create_price(jobber(99.0)).await.unwrap();
    h.engine.assembler().get(PART_11000, &caller("alpha")).await.unwrap();
    h.engine.write_backs().flush().await;

    writer.delete_price(created.id).await.unwrap();
    let read = h
        .engine
        .assembler()
        .get(PART_11000, &caller("alpha"))
        .await
        .unwrap();
    assert_eq!(read.part.pricing.len(), 2);
    assert!(writer.get_price(created.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_replaced_facet_rows_are_visible() {
    let h = harness();
    h.engine.assembler().get(PART_11000, &caller("alpha")).await.unwrap();
    h.engine.write_backs().flush().await;

    h.engine
        .writer()
        .replace_facet(
            PART_11000,
            FacetKind::Attributes,
            vec![Row::new().with("field", "Finish").with("value", "Chrome")],
        )
        .await
        .unwrap();

    let read = h
        .engine
        .assembler()
        .get(PART_11000, &caller("alpha"))
        .await
        .unwrap();
    assert!(!read.from_cache);
    assert_eq!(read.part.attributes.len(), 1);
    assert_eq!(read.part.attributes.items()[0].value, "Chrome");
}

#[tokio::test]
async fn test_replaced_pricing_rows_drop_facet_record() {
    let h = harness();
    h.engine.assembler().get(PART_11000, &caller("alpha")).await.unwrap();
    h.engine.write_backs().flush().await;

    h.engine
        .writer()
        .replace_facet(
            PART_11000,
            FacetKind::Pricing,
            vec![Row::new().with("price_type", "List").with("price", 259.99)],
        )
        .await
        .unwrap();
    assert!(!h.store.contains(&CacheKey::part_facet(PART_11000, FacetKind::Pricing)));

    let read = h
        .engine
        .assembler()
        .get(PART_11000, &caller("alpha"))
        .await
        .unwrap();
    assert_eq!(read.part.pricing.len(), 1);
    assert_eq!(read.part.pricing.items()[0].price, 259.99);
}

#[tokio::test]
async fn test_invalidation_failure_is_reported_after_write() {
    let store = Arc::new(FlakyCacheStore::new());
    let (engine, source, _) = engine_over(fixtures::fast_config(), store.clone());
    let before = source.catalog().price_count();

    store.fail_writes(true);
    let result = engine.writer().create_price(jobber(10.0)).await;
    assert!(matches!(result, Err(CatalogError::Cache(_))), "{result:?}");
    // The row itself was written; only the invalidation failed.
    assert_eq!(source.catalog().price_count(), before + 1);
}

#[tokio::test]
async fn test_cache_read_fault_falls_back_to_source() {
    let store = Arc::new(FlakyCacheStore::new());
    let (engine, _, _) = engine_over(fixtures::fast_config(), store.clone());
    store.fail_reads(true);

    let read = engine
        .assembler()
        .get(PART_11000, &caller("alpha"))
        .await
        .unwrap();
    assert!(!read.from_cache);
    assert!(!read.partial());
}

#[tokio::test]
async fn test_lmdb_backed_engine_caches_parts() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let config = ApiConfig {
        cache_path: Some(dir.path().join("cache")),
        cache_max_mb: 10,
        catalog: fixtures::fast_config(),
        ..ApiConfig::default()
    };
    let store = config.cache_store().unwrap();

    let catalog = Arc::new(fixtures::seeded_catalog());
    let parts = Collaborators::in_memory(catalog, Arc::new(fixtures::two_callers())).with_cache(store);
    let engine = CatalogEngine::new(config.catalog.clone(), parts).unwrap();

    let first = engine.assembler().get(PART_11000, &caller("alpha")).await.unwrap();
    engine.write_backs().flush().await;
    let second = engine.assembler().get(PART_11000, &caller("beta")).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.part, first.part);
    assert_eq!(second.customer.price, 205.25);

    engine.writer().invalidate_part(PART_11000).await.unwrap();
    let third = engine.assembler().get(PART_11000, &caller("alpha")).await.unwrap();
    assert!(!third.from_cache);
}

#[tokio::test]
async fn test_engine_rejects_invalid_config() {
    let config = fixtures::fast_config().with_facet_timeout(std::time::Duration::ZERO);
    let parts = Collaborators::in_memory(
        Arc::new(InMemoryCatalog::new()),
        Arc::new(fixtures::two_callers()),
    );
    assert!(matches!(
        CatalogEngine::new(config, parts),
        Err(CatalogError::Config(_))
    ));
}
