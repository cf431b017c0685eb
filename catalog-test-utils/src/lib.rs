//! Catalog Test Utilities
//!
//! Shared test infrastructure for the catalog workspace:
//! - Proptest generators for parts and their facets
//! - Scripted data sources, customer providers and cache stores
//! - Fixtures for the seeded reference part
//! - Assertions for catalog results

// Re-export the in-memory source from its crate
pub use catalog_storage::{InMemoryCacheStore, InMemoryCatalog, Row};

// Re-export core types for convenience
pub use catalog_core::{
    AggregateError, Attribute, CallerKey, CatalogConfig, CatalogError, CatalogResult,
    CategoryCrumb, ContentBlock, CustomerContext, Facet, FacetErrorKind, FacetKind, FacetValue,
    Image, Package, Part, PartBasics, PartId, Pricing, Review, StorageError, Timestamp, Vehicle,
    Video,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use catalog_api::CustomerContextProvider;
use catalog_storage::{CacheKey, CacheStats, CacheStore, DataSource};

// ============================================================================
// SCRIPTED DATA SOURCE
// ============================================================================

/// Behavior injected in front of one facet's statement.
#[derive(Debug, Clone)]
pub enum Script {
    /// Fail with a query error.
    Fail(String),
    /// Sleep before answering.
    Delay(Duration),
    /// Panic inside the fetch.
    Panic,
}

/// [`DataSource`] over an [`InMemoryCatalog`] whose statements can be made
/// to fail, stall or panic per facet.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDataSource {
    inner: InMemoryCatalog,
    scripts: Arc<RwLock<HashMap<FacetKind, Script>>>,
    calls: Arc<RwLock<HashMap<FacetKind, u64>>>,
}

impl ScriptedDataSource {
    pub fn new(inner: InMemoryCatalog) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn catalog(&self) -> &InMemoryCatalog {
        &self.inner
    }

    pub fn fail(&self, facet: FacetKind, reason: impl Into<String>) {
        self.script(facet, Script::Fail(reason.into()));
    }

    pub fn delay(&self, facet: FacetKind, delay: Duration) {
        self.script(facet, Script::Delay(delay));
    }

    pub fn panic_on(&self, facet: FacetKind) {
        self.script(facet, Script::Panic);
    }

    pub fn script(&self, facet: FacetKind, script: Script) {
        if let Ok(mut scripts) = self.scripts.write() {
            scripts.insert(facet, script);
        }
    }

    /// Remove every injected behavior.
    pub fn reset(&self) {
        if let Ok(mut scripts) = self.scripts.write() {
            scripts.clear();
        }
    }

    /// Statements executed for `facet` so far.
    pub fn calls(&self, facet: FacetKind) -> u64 {
        self.calls
            .read()
            .map(|calls| calls.get(&facet).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    async fn before(&self, facet: FacetKind) -> CatalogResult<()> {
        if let Ok(mut calls) = self.calls.write() {
            *calls.entry(facet).or_default() += 1;
        }
        let script = self
            .scripts
            .read()
            .ok()
            .and_then(|scripts| scripts.get(&facet).cloned());
        match script {
            None => Ok(()),
            Some(Script::Fail(reason)) => Err(StorageError::QueryFailed {
                statement: facet.to_string(),
                reason,
            }
            .into()),
            Some(Script::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(Script::Panic) => panic!("scripted panic in {facet}"),
        }
    }
}

#[async_trait]
impl DataSource for ScriptedDataSource {
    async fn query_one(&self, statement: FacetKind, part_id: PartId) -> CatalogResult<Option<Row>> {
        self.before(statement).await?;
        self.inner.query_one(statement, part_id).await
    }

    async fn query_many(&self, statement: FacetKind, part_id: PartId) -> CatalogResult<Vec<Row>> {
        self.before(statement).await?;
        self.inner.query_many(statement, part_id).await
    }
}

// ============================================================================
// MOCK CUSTOMER PROVIDER
// ============================================================================

/// Customer provider with a fixed price and cart per caller.
///
/// Unknown callers are an error, as is every lookup while failing.
#[derive(Debug, Default)]
pub struct MockCustomerProvider {
    callers: RwLock<HashMap<CallerKey, CustomerContext>>,
    failing: AtomicBool,
    delay: RwLock<Option<Duration>>,
    calls: AtomicU64,
}

impl MockCustomerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caller(self, caller: &CallerKey, price: f64, cart_reference: i64) -> Self {
        if let Ok(mut callers) = self.callers.write() {
            callers.insert(
                caller.clone(),
                CustomerContext {
                    price,
                    cart_reference,
                },
            );
        }
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.delay.write() {
            *slot = delay;
        }
    }

    /// Lookups served so far. A binding makes two.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn context(&self, caller: &CallerKey) -> CatalogResult<CustomerContext> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay.read().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(customer_failure(caller, "customer service unavailable"));
        }
        self.callers
            .read()
            .ok()
            .and_then(|callers| callers.get(caller).cloned())
            .ok_or_else(|| customer_failure(caller, "unknown caller"))
    }
}

fn customer_failure(caller: &CallerKey, reason: &str) -> CatalogError {
    StorageError::QueryFailed {
        statement: format!("customer {caller}"),
        reason: reason.to_string(),
    }
    .into()
}

#[async_trait]
impl CustomerContextProvider for MockCustomerProvider {
    async fn price_for(&self, caller: &CallerKey, _part_id: PartId) -> CatalogResult<f64> {
        Ok(self.context(caller).await?.price)
    }

    async fn cart_reference_for(&self, caller: &CallerKey, _part_id: PartId) -> CatalogResult<i64> {
        Ok(self.context(caller).await?.cart_reference)
    }
}

// ============================================================================
// FLAKY CACHE STORE
// ============================================================================

/// In-memory cache store whose operations can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyCacheStore {
    inner: InMemoryCacheStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryCacheStore {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail `set`, `expire` and `delete`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> CatalogResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(catalog_core::CacheError::Backend {
                reason: format!("{op} refused"),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyCacheStore {
    async fn get(&self, key: &CacheKey) -> CatalogResult<Option<Vec<u8>>> {
        self.check(&self.fail_reads, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> CatalogResult<()> {
        self.check(&self.fail_writes, "set")?;
        self.inner.set(key, value, ttl).await
    }

    async fn expire(&self, key: &CacheKey, ttl: Duration) -> CatalogResult<bool> {
        self.check(&self.fail_writes, "expire")?;
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> CatalogResult<bool> {
        self.check(&self.fail_writes, "delete")?;
        self.inner.delete(key).await
    }

    async fn stats(&self) -> CatalogResult<CacheStats> {
        self.inner.stats().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    pub fn arb_part_id() -> impl Strategy<Value = PartId> {
        (1i64..10_000_000).prop_map(PartId::new)
    }

    /// Second-precision timestamps between 2000 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (946_684_800i64..1_893_456_000).prop_map(|secs| {
            Utc.timestamp_opt(secs, 0)
                .single()
                .unwrap_or_else(Utc::now)
        })
    }

    /// Non-negative finite amounts: everyday prices plus the whole positive
    /// range, most of which need 17 significant digits to print exactly.
    pub fn arb_amount() -> impl Strategy<Value = f64> {
        prop_oneof![
            0.0f64..100_000.0,
            prop::num::f64::POSITIVE
                | prop::num::f64::NORMAL
                | prop::num::f64::SUBNORMAL
                | prop::num::f64::ZERO,
        ]
    }

    pub fn arb_caller() -> impl Strategy<Value = CallerKey> {
        "[a-f0-9]{8}-[a-f0-9]{4}".prop_map(CallerKey::new)
    }

    pub fn arb_basics() -> impl Strategy<Value = PartBasics> {
        (
            prop::sample::select(vec![800, 900]),
            prop::option::of(arb_timestamp()),
            prop::option::of(arb_timestamp()),
            "[a-zA-Z0-9 ]{0,60}",
            0i32..10,
            "[A-Z][a-z]{2,12}",
        )
            .prop_map(
                |(status, date_added, date_modified, short_desc, price_code, part_class)| {
                    PartBasics {
                        status,
                        date_added,
                        date_modified,
                        short_desc,
                        price_code,
                        part_class,
                    }
                },
            )
    }

    pub fn arb_attribute() -> impl Strategy<Value = Attribute> {
        ("[A-Z][a-z]{2,15}", "[a-zA-Z0-9 .]{1,30}")
            .prop_map(|(key, value)| Attribute { key, value })
    }

    pub fn arb_pricing() -> impl Strategy<Value = Pricing> {
        (
            prop::sample::select(vec!["List", "Jobber", "Map", "eMap"]),
            arb_amount(),
            any::<bool>(),
        )
            .prop_map(|(price_type, price, enforced)| Pricing {
                price_type: price_type.to_string(),
                price,
                enforced: enforced || price_type == "Map",
            })
    }

    pub fn arb_review() -> impl Strategy<Value = Review> {
        (
            1i32..=5,
            "[a-zA-Z ]{1,30}",
            "[a-zA-Z0-9 .,!]{0,120}",
            "[A-Z][a-z]{1,10}",
            "[a-z]{1,10}@example\\.com",
            prop::option::of(arb_timestamp()),
        )
            .prop_map(
                |(rating, subject, review_text, name, email, created_date)| Review {
                    rating,
                    subject,
                    review_text,
                    name,
                    email,
                    created_date,
                },
            )
    }

    pub fn arb_image() -> impl Strategy<Value = Image> {
        (
            prop::sample::select(vec!["Tall", "Grande", "Venti"]),
            "[a-z]",
            1i32..2000,
            1i32..2000,
            "/images/[a-z0-9]{4,12}\\.jpg",
        )
            .prop_map(|(size, sort, height, width, path)| Image {
                size: size.to_string(),
                sort,
                height,
                width,
                path,
            })
    }

    pub fn arb_video() -> impl Strategy<Value = Video> {
        ("[A-Za-z0-9_-]{11}", "[a-zA-Z ]{1,40}", "[A-Z][a-z]{2,10}", any::<bool>()).prop_map(
            |(youtube_id, title, video_type, is_primary)| Video {
                youtube_id,
                title,
                video_type,
                is_primary,
            },
        )
    }

    pub fn arb_package() -> impl Strategy<Value = Package> {
        (arb_amount(), arb_amount(), arb_amount(), arb_amount(), 1i32..100).prop_map(
            |(height, width, length, weight, quantity)| Package {
                height,
                width,
                length,
                weight,
                dimension_unit: "IN".to_string(),
                weight_unit: "LB".to_string(),
                package_unit: "EA".to_string(),
                quantity,
            },
        )
    }

    pub fn arb_category() -> impl Strategy<Value = CategoryCrumb> {
        (
            1i64..100_000,
            prop::option::of(1i64..100_000),
            "[A-Z][a-z ]{2,20}",
            "[a-z ]{0,40}",
        )
            .prop_map(|(category_id, parent_id, title, short_desc)| CategoryCrumb {
                category_id,
                parent_id,
                title,
                short_desc,
            })
    }

    pub fn arb_content() -> impl Strategy<Value = ContentBlock> {
        ("[A-Z][a-zA-Z]{2,15}", "[a-zA-Z0-9 .]{0,80}")
            .prop_map(|(key, value)| ContentBlock { key, value })
    }

    /// One fetched value per part facet.
    pub fn arb_facet_values() -> impl Strategy<Value = Vec<FacetValue>> {
        (
            arb_basics(),
            prop::collection::vec(arb_attribute(), 0..5),
            prop::collection::vec(arb_pricing(), 0..4),
            prop::collection::vec(arb_review(), 0..4),
            prop::collection::vec(arb_image(), 0..3),
            prop::collection::vec(arb_video(), 0..2),
            prop::collection::btree_set(1i64..10_000_000, 0..5),
            prop::collection::vec(arb_package(), 0..2),
            prop::collection::vec(arb_category(), 0..3),
            prop::collection::vec(arb_content(), 0..3),
            prop::option::of("/install/[a-z0-9]{4,10}\\.pdf"),
        )
            .prop_map(
                |(
                    basics,
                    attributes,
                    pricing,
                    reviews,
                    images,
                    videos,
                    related,
                    packages,
                    categories,
                    blocks,
                    install_sheet,
                )| {
                    vec![
                        FacetValue::Basics(basics),
                        FacetValue::Attributes(attributes),
                        FacetValue::Pricing(pricing),
                        FacetValue::Reviews(reviews),
                        FacetValue::Images(images),
                        FacetValue::Videos(videos),
                        FacetValue::Related(related.into_iter().map(PartId::new).collect()),
                        FacetValue::Packaging(packages),
                        FacetValue::Categories(categories),
                        FacetValue::Content {
                            blocks,
                            install_sheet,
                        },
                    ]
                },
            )
    }

    /// A fully assembled part. Facets other than basics fail at random.
    pub fn arb_part() -> impl Strategy<Value = Part> {
        (
            arb_part_id(),
            arb_facet_values(),
            prop::collection::vec(any::<bool>(), FacetKind::PART_FACETS.len()),
        )
            .prop_map(|(part_id, values, failed)| {
                let mut part = Part::new(part_id);
                for (value, failed) in values.into_iter().zip(failed) {
                    let kind = value.kind();
                    if failed && kind != FacetKind::Basics {
                        part.mark_failed(kind);
                    } else {
                        part.apply(value);
                    }
                }
                part
            })
    }

    /// A fully assembled part with no failed facet.
    pub fn arb_complete_part() -> impl Strategy<Value = Part> {
        (arb_part_id(), arb_facet_values()).prop_map(|(part_id, values)| {
            let mut part = Part::new(part_id);
            for value in values {
                part.apply(value);
            }
            part
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// The reference part: three attributes, two prices, no reviews and one
    /// related part.
    pub const PART_11000: PartId = PartId::new(11000);

    /// A part id nothing is seeded for.
    pub const MISSING_PART: PartId = PartId::new(99999);

    pub const RELATED_TO_11000: PartId = PartId::new(11001);

    /// Short deadlines so timeout tests finish quickly.
    pub fn fast_config() -> CatalogConfig {
        CatalogConfig::new()
            .with_facet_timeout(Duration::from_millis(200))
            .with_context_timeout(Duration::from_millis(200))
    }

    pub fn caller(name: &str) -> CallerKey {
        CallerKey::new(name)
    }

    /// Provider knowing callers "alpha" (price 199.5, cart 1) and "beta"
    /// (price 205.25, cart 2).
    pub fn two_callers() -> MockCustomerProvider {
        MockCustomerProvider::new()
            .with_caller(&caller("alpha"), 199.5, 1)
            .with_caller(&caller("beta"), 205.25, 2)
    }

    pub fn basics_row(status: i64, short_desc: &str) -> Row {
        Row::new()
            .with("status", status)
            .with("date_added", "2012-01-10 09:30:00")
            .with("date_modified", "2015-06-01 12:00:00")
            .with("short_desc", short_desc)
            .with("price_code", 3i64)
            .with("class", "Hitch")
    }

    /// Seed an active part with basics only.
    pub fn seed_basic_part(catalog: &InMemoryCatalog, part_id: PartId, short_desc: &str) {
        catalog.insert_rows(FacetKind::Basics, part_id, vec![basics_row(800, short_desc)]);
    }

    pub fn seed_part_11000(catalog: &InMemoryCatalog) {
        let id = PART_11000;
        seed_basic_part(catalog, id, "Class III Trailer Hitch");
        catalog.insert_rows(
            FacetKind::Attributes,
            id,
            vec![
                Row::new().with("field", "Finish").with("value", "Black"),
                Row::new().with("field", "Class").with("value", "III"),
                Row::new().with("field", "Receiver").with("value", "2 in."),
            ],
        );
        catalog.insert_rows(
            FacetKind::Pricing,
            id,
            vec![
                Row::new()
                    .with("price_type", "List")
                    .with("price", 249.99)
                    .with("enforced", false),
                Row::new()
                    .with("price_type", "Map")
                    .with("price", 199.99)
                    .with("enforced", true),
            ],
        );
        catalog.insert_rows(
            FacetKind::Related,
            id,
            vec![Row::new().with("related_id", RELATED_TO_11000.get())],
        );
        catalog.insert_rows(
            FacetKind::Images,
            id,
            vec![Row::new()
                .with("size", "Grande")
                .with("sort", "a")
                .with("height", 500i64)
                .with("width", 500i64)
                .with("path", "/images/11000_a.jpg")],
        );
        catalog.insert_rows(
            FacetKind::Categories,
            id,
            vec![Row::new()
                .with("category_id", 3i64)
                .with("parent_id", Option::<i64>::None)
                .with("title", "Trailer Hitches")
                .with("short_desc", "Receiver hitches")],
        );
        catalog.insert_rows(
            FacetKind::Content,
            id,
            vec![
                Row::new().with("key", "Note").with("text", "Fits most sedans"),
                Row::new()
                    .with("key", "InstallationSheet")
                    .with("text", "/install/11000.pdf"),
            ],
        );
        catalog.insert_vehicle_notes(
            reference_vehicle(),
            id,
            vec!["Requires drilling".to_string()],
        );
    }

    pub fn reference_vehicle() -> Vehicle {
        Vehicle::new(2012, "Ford", "Fusion").with_submodel("SE")
    }

    /// A catalog holding the reference part and its related part.
    pub fn seeded_catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        seed_part_11000(&catalog);
        seed_basic_part(&catalog, RELATED_TO_11000, "Hitch Ball Mount");
        catalog
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    pub fn assert_not_found<T: std::fmt::Debug>(result: &CatalogResult<T>) {
        match result {
            Err(e) => assert!(e.is_not_found(), "Expected NotFound, got {e:?}"),
            Ok(v) => panic!("Expected NotFound, got Ok({v:?})"),
        }
    }

    pub fn assert_context_bind<T: std::fmt::Debug>(result: &CatalogResult<T>) {
        assert!(
            matches!(result, Err(CatalogError::ContextBind { .. })),
            "Expected ContextBind error, got {result:?}"
        );
    }

    /// Assert exactly `expected` facets failed.
    pub fn assert_failed_facets(failures: &AggregateError, expected: &[FacetKind]) {
        let mut actual: Vec<FacetKind> = failures.facets().collect();
        let mut expected = expected.to_vec();
        actual.sort();
        expected.sort();
        assert_eq!(actual, expected, "Unexpected failed facets: {failures}");
    }

    pub fn assert_failure_kind(failures: &AggregateError, facet: FacetKind, kind: FacetErrorKind) {
        match failures.get(facet) {
            Some(failure) => assert_eq!(failure.kind, kind, "Wrong failure kind for {facet}"),
            None => panic!("Expected {facet} to fail, failures: {failures}"),
        }
    }
}
