//! Facet sub-fetchers
//!
//! One fetcher per part facet. Each runs one statement against the data
//! source and decodes the rows into its [`FacetValue`]. Zero rows is a
//! valid, empty value; only basics treats a missing row as "no such part".

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{
    Attribute, CatalogConfig, CatalogError, CategoryCrumb, ContentBlock, FacetError,
    FacetErrorKind, FacetKind, FacetValue, Image, Package, PartBasics, PartId, Pricing, Review,
    StorageError, Video,
};
use catalog_storage::{
    decode_record, encode_record, CacheKey, CacheStore, DataSource, Row, WriteBackTasks,
};

/// Price type that is always enforced, whatever the row says.
const ENFORCED_PRICE_TYPE: &str = "Map";

/// Content keys containing this marker carry the install sheet location.
const INSTALL_SHEET_MARKER: &str = "install";

/// Fetches one facet of a part.
#[async_trait]
pub trait FacetFetcher: Send + Sync {
    fn facet(&self) -> FacetKind;

    async fn fetch(&self, part_id: PartId) -> Result<FacetValue, FacetError>;
}

fn source_failure(facet: FacetKind, err: CatalogError) -> FacetError {
    match err {
        CatalogError::Storage(storage) => FacetError::from_storage(facet, &storage),
        other => FacetError::new(facet, FacetErrorKind::Query, other.to_string()),
    }
}

fn decode_all<T>(
    facet: FacetKind,
    rows: &[Row],
    decode: impl Fn(&Row) -> Result<T, StorageError>,
) -> Result<Vec<T>, FacetError> {
    rows.iter()
        .map(|row| decode(row).map_err(|e| FacetError::from_storage(facet, &e)))
        .collect()
}

// ============================================================================
// BASICS
// ============================================================================

/// Scalar part fields. A missing row, or a part outside the active
/// statuses, is reported as [`FacetErrorKind::NoRows`].
pub struct BasicsFetcher {
    source: Arc<dyn DataSource>,
    active_statuses: Vec<i32>,
}

impl BasicsFetcher {
    pub fn new(source: Arc<dyn DataSource>, config: &CatalogConfig) -> Self {
        Self {
            source,
            active_statuses: config.active_statuses.clone(),
        }
    }
}

#[async_trait]
impl FacetFetcher for BasicsFetcher {
    fn facet(&self) -> FacetKind {
        FacetKind::Basics
    }

    async fn fetch(&self, part_id: PartId) -> Result<FacetValue, FacetError> {
        let row = self
            .source
            .query_one(FacetKind::Basics, part_id)
            .await
            .map_err(|e| source_failure(FacetKind::Basics, e))?
            .ok_or_else(|| FacetError::no_rows(FacetKind::Basics, part_id))?;

        let basics = decode_basics(&row).map_err(|e| FacetError::from_storage(FacetKind::Basics, &e))?;
        if !self.active_statuses.contains(&basics.status) {
            return Err(FacetError::new(
                FacetKind::Basics,
                FacetErrorKind::NoRows,
                format!("part {part_id} has inactive status {}", basics.status),
            ));
        }
        Ok(FacetValue::Basics(basics))
    }
}

fn decode_basics(row: &Row) -> Result<PartBasics, StorageError> {
    Ok(PartBasics {
        status: row.int32("status")?,
        date_added: row.timestamp("date_added"),
        date_modified: row.timestamp("date_modified"),
        short_desc: row.str("short_desc")?,
        price_code: row.int32("price_code")?,
        part_class: row.str("class")?,
    })
}

// ============================================================================
// LIST FACETS
// ============================================================================

/// Fetcher for every facet backed by a plain multi-row statement.
pub struct RowsFetcher {
    facet: FacetKind,
    source: Arc<dyn DataSource>,
}

impl RowsFetcher {
    pub fn new(facet: FacetKind, source: Arc<dyn DataSource>) -> Self {
        Self { facet, source }
    }
}

#[async_trait]
impl FacetFetcher for RowsFetcher {
    fn facet(&self) -> FacetKind {
        self.facet
    }

    async fn fetch(&self, part_id: PartId) -> Result<FacetValue, FacetError> {
        let rows = self
            .source
            .query_many(self.facet, part_id)
            .await
            .map_err(|e| source_failure(self.facet, e))?;
        decode_facet(self.facet, &rows)
    }
}

/// Decode the rows of a list facet.
pub fn decode_facet(facet: FacetKind, rows: &[Row]) -> Result<FacetValue, FacetError> {
    let value = match facet {
        FacetKind::Attributes => FacetValue::Attributes(decode_all(facet, rows, |row| {
            Ok(Attribute {
                key: row.str("field")?,
                value: row.str("value")?,
            })
        })?),
        FacetKind::Pricing => FacetValue::Pricing(decode_all(facet, rows, decode_pricing)?),
        FacetKind::Reviews => FacetValue::Reviews(decode_all(facet, rows, |row| {
            Ok(Review {
                rating: row.int32("rating")?,
                subject: row.str("subject")?,
                review_text: row.str("review_text")?,
                name: row.str("name")?,
                email: row.str("email")?,
                created_date: row.timestamp("created_date"),
            })
        })?),
        FacetKind::Images => FacetValue::Images(decode_all(facet, rows, |row| {
            Ok(Image {
                size: row.str("size")?,
                sort: row.str("sort")?,
                height: row.int32("height")?,
                width: row.int32("width")?,
                path: row.str("path")?,
            })
        })?),
        FacetKind::Videos => FacetValue::Videos(decode_all(facet, rows, |row| {
            Ok(Video {
                youtube_id: row.str("youtube_id")?,
                title: row.str("title")?,
                video_type: row.str("video_type")?,
                is_primary: row.force_bool("is_primary"),
            })
        })?),
        FacetKind::Related => {
            let ids = decode_all(facet, rows, |row| row.int("related_id"))?;
            let distinct: BTreeSet<i64> = ids.into_iter().collect();
            FacetValue::Related(distinct.into_iter().map(PartId::new).collect())
        }
        FacetKind::Packaging => FacetValue::Packaging(decode_all(facet, rows, |row| {
            Ok(Package {
                height: row.float("height")?,
                width: row.float("width")?,
                length: row.float("length")?,
                weight: row.float("weight")?,
                dimension_unit: row.str("dimension_unit")?,
                weight_unit: row.str("weight_unit")?,
                package_unit: row.str("package_unit")?,
                quantity: row.int32("quantity")?,
            })
        })?),
        FacetKind::Categories => FacetValue::Categories(decode_all(facet, rows, |row| {
            Ok(CategoryCrumb {
                category_id: row.int("category_id")?,
                parent_id: row.opt_int("parent_id")?,
                title: row.str("title")?,
                short_desc: row.str("short_desc")?,
            })
        })?),
        FacetKind::Content => {
            let entries = decode_all(facet, rows, |row| {
                Ok(ContentBlock {
                    key: row.str("key")?,
                    value: row.str("text")?,
                })
            })?;
            split_install_sheet(entries)
        }
        FacetKind::Basics | FacetKind::VehicleNotes => {
            return Err(FacetError::new(
                facet,
                FacetErrorKind::Query,
                "not a list facet",
            ))
        }
    };
    Ok(value)
}

fn decode_pricing(row: &Row) -> Result<Pricing, StorageError> {
    let price_type = row.str("price_type")?;
    let enforced = price_type == ENFORCED_PRICE_TYPE || row.force_bool("enforced");
    Ok(Pricing {
        price_type,
        price: row.float("price")?,
        enforced,
    })
}

/// Pull the first install-sheet entry out of the content blocks.
fn split_install_sheet(entries: Vec<ContentBlock>) -> FacetValue {
    let mut install_sheet = None;
    let mut blocks = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.key.to_lowercase().contains(INSTALL_SHEET_MARKER) {
            if install_sheet.is_none() {
                install_sheet = Some(entry.value);
            }
        } else {
            blocks.push(entry);
        }
    }
    FacetValue::Content {
        blocks,
        install_sheet,
    }
}

// ============================================================================
// PRICING (facet-level cache)
// ============================================================================

/// Pricing fetcher with its own cache-aside record under
/// `part:{id}:pricing`.
///
/// Cache faults and undecodable records fall through to the source. Fresh
/// results are written back on the shared write-back group.
pub struct PricingFetcher {
    rows: RowsFetcher,
    store: Arc<dyn CacheStore>,
    tasks: WriteBackTasks,
    ttl: Duration,
}

impl PricingFetcher {
    pub fn new(
        source: Arc<dyn DataSource>,
        store: Arc<dyn CacheStore>,
        tasks: WriteBackTasks,
        ttl: Duration,
    ) -> Self {
        Self {
            rows: RowsFetcher::new(FacetKind::Pricing, source),
            store,
            tasks,
            ttl,
        }
    }

    async fn cached(&self, key: &CacheKey) -> Option<Vec<Pricing>> {
        match self.store.get(key).await {
            Ok(Some(bytes)) if !bytes.is_empty() => match decode_record(key, &bytes) {
                Ok(prices) => Some(prices),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable pricing record");
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Pricing cache read failed, treating as miss");
                None
            }
        }
    }
}

#[async_trait]
impl FacetFetcher for PricingFetcher {
    fn facet(&self) -> FacetKind {
        FacetKind::Pricing
    }

    async fn fetch(&self, part_id: PartId) -> Result<FacetValue, FacetError> {
        let key = CacheKey::part_facet(part_id, FacetKind::Pricing);
        if let Some(prices) = self.cached(&key).await {
            tracing::trace!(key = %key, "Pricing cache hit");
            return Ok(FacetValue::Pricing(prices));
        }

        let seen = self.tasks.generation(&key);
        let value = self.rows.fetch(part_id).await?;
        if let FacetValue::Pricing(prices) = &value {
            match encode_record(&key, prices) {
                Ok(bytes) => {
                    let store = Arc::clone(&self.store);
                    let tasks = self.tasks.clone();
                    let ttl = self.ttl;
                    self.tasks.spawn(async move {
                        let written = tasks
                            .store_if_current(store.as_ref(), &key, &bytes, ttl, seen)
                            .await;
                        if let Err(e) = written {
                            tracing::warn!(key = %key, error = %e, "Pricing write-back failed");
                        }
                    });
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "Pricing encode failed"),
            }
        }
        Ok(value)
    }
}

/// The standard fetcher set: one per part facet, pricing behind its cache.
pub fn standard_fetchers(
    source: Arc<dyn DataSource>,
    store: Arc<dyn CacheStore>,
    tasks: WriteBackTasks,
    config: &CatalogConfig,
) -> Vec<Arc<dyn FacetFetcher>> {
    FacetKind::PART_FACETS
        .iter()
        .map(|facet| -> Arc<dyn FacetFetcher> {
            match facet {
                FacetKind::Basics => Arc::new(BasicsFetcher::new(Arc::clone(&source), config)),
                FacetKind::Pricing => Arc::new(PricingFetcher::new(
                    Arc::clone(&source),
                    Arc::clone(&store),
                    tasks.clone(),
                    config.pricing_ttl,
                )),
                other => Arc::new(RowsFetcher::new(*other, Arc::clone(&source))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_storage::{InMemoryCacheStore, InMemoryCatalog};

    fn catalog() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::new())
    }

    fn basics_row(status: i64) -> Row {
        Row::new()
            .with("status", status)
            .with("date_added", "2014-03-07 15:04:05")
            .with("date_modified", Option::<String>::None)
            .with("short_desc", "Class III Trailer Hitch")
            .with("price_code", 12)
            .with("class", "Hitch")
    }

    #[tokio::test]
    async fn test_basics_missing_is_no_rows() {
        let fetcher = BasicsFetcher::new(catalog(), &CatalogConfig::default());
        let err = fetcher.fetch(PartId::new(99999)).await.unwrap_err();
        assert_eq!(err.kind, FacetErrorKind::NoRows);
    }

    #[tokio::test]
    async fn test_basics_inactive_status_is_no_rows() {
        let source = catalog();
        source.insert_rows(FacetKind::Basics, PartId::new(1), vec![basics_row(700)]);
        let fetcher = BasicsFetcher::new(source, &CatalogConfig::default());

        let err = fetcher.fetch(PartId::new(1)).await.unwrap_err();
        assert_eq!(err.kind, FacetErrorKind::NoRows);
        assert!(err.message.contains("700"));
    }

    #[tokio::test]
    async fn test_basics_decodes() {
        let source = catalog();
        source.insert_rows(FacetKind::Basics, PartId::new(11000), vec![basics_row(800)]);
        let fetcher = BasicsFetcher::new(source, &CatalogConfig::default());

        let FacetValue::Basics(basics) = fetcher.fetch(PartId::new(11000)).await.unwrap() else {
            panic!("expected basics");
        };
        assert_eq!(basics.status, 800);
        assert_eq!(basics.part_class, "Hitch");
        assert!(basics.date_added.is_some());
        assert!(basics.date_modified.is_none());
    }

    #[tokio::test]
    async fn test_basics_wide_status_is_decode_failure() {
        let source = catalog();
        source.insert_rows(
            FacetKind::Basics,
            PartId::new(1),
            vec![basics_row((1i64 << 32) + 800)],
        );
        let fetcher = BasicsFetcher::new(source, &CatalogConfig::default());

        let err = fetcher.fetch(PartId::new(1)).await.unwrap_err();
        assert_eq!(err.kind, FacetErrorKind::Decode);
        assert!(err.message.contains("status"), "{}", err.message);
    }

    #[test]
    fn test_wide_image_dimension_is_decode_failure() {
        let rows = vec![Row::new()
            .with("size", "Tall")
            .with("sort", "a")
            .with("height", i64::from(i32::MAX) + 1)
            .with("width", 300)
            .with("path", "/images/11000.jpg")];
        let err = decode_facet(FacetKind::Images, &rows).unwrap_err();
        assert_eq!(err.kind, FacetErrorKind::Decode);
    }

    #[test]
    fn test_map_price_is_enforced() {
        let rows = vec![
            Row::new().with("price_type", "List").with("price", 10.0).with("enforced", 0),
            Row::new().with("price_type", "Map").with("price", 8.0).with("enforced", 0),
        ];
        let FacetValue::Pricing(prices) = decode_facet(FacetKind::Pricing, &rows).unwrap() else {
            panic!("expected pricing");
        };
        assert!(!prices[0].enforced);
        assert!(prices[1].enforced);
    }

    #[test]
    fn test_related_is_distinct_and_sorted() {
        let rows: Vec<Row> = [5, 3, 5, 1]
            .into_iter()
            .map(|id| Row::new().with("related_id", id as i64))
            .collect();
        let value = decode_facet(FacetKind::Related, &rows).unwrap();
        assert_eq!(
            value,
            FacetValue::Related(vec![PartId::new(1), PartId::new(3), PartId::new(5)])
        );
    }

    #[test]
    fn test_install_sheet_split_from_content() {
        let rows = vec![
            Row::new().with("key", "Marketing").with("text", "Tows anything"),
            Row::new().with("key", "InstallationSheet").with("text", "11000.pdf"),
            Row::new().with("key", "install video").with("text", "ignored.pdf"),
        ];
        let FacetValue::Content {
            blocks,
            install_sheet,
        } = decode_facet(FacetKind::Content, &rows).unwrap()
        else {
            panic!("expected content");
        };
        assert_eq!(blocks.len(), 1);
        assert_eq!(install_sheet.as_deref(), Some("11000.pdf"));
    }

    #[test]
    fn test_decode_failure_is_decode_kind() {
        let rows = vec![Row::new().with("field", "Finish")];
        let err = decode_facet(FacetKind::Attributes, &rows).unwrap_err();
        assert_eq!(err.kind, FacetErrorKind::Decode);
        assert_eq!(err.facet, FacetKind::Attributes);
    }

    #[test]
    fn test_empty_rows_are_empty_value() {
        let value = decode_facet(FacetKind::Reviews, &[]).unwrap();
        assert_eq!(value, FacetValue::Reviews(vec![]));
    }

    #[tokio::test]
    async fn test_pricing_cache_serves_second_fetch() {
        let source = catalog();
        source.insert_rows(
            FacetKind::Pricing,
            PartId::new(11000),
            vec![Row::new().with("price_type", "List").with("price", 249.99)],
        );
        let store = Arc::new(InMemoryCacheStore::new());
        let tasks = WriteBackTasks::new();
        let fetcher = PricingFetcher::new(
            source.clone(),
            store.clone(),
            tasks.clone(),
            Duration::from_secs(60),
        );

        fetcher.fetch(PartId::new(11000)).await.unwrap();
        tasks.flush().await;
        assert!(store.contains(&CacheKey::part_facet(PartId::new(11000), FacetKind::Pricing)));

        let before = source.query_count();
        let value = fetcher.fetch(PartId::new(11000)).await.unwrap();
        assert_eq!(source.query_count(), before);
        assert_eq!(value.row_count(), 1);
    }

    #[tokio::test]
    async fn test_pricing_invalidated_before_write_back_is_not_cached() {
        let source = catalog();
        source.insert_rows(
            FacetKind::Pricing,
            PartId::new(11000),
            vec![Row::new().with("price_type", "List").with("price", 249.99)],
        );
        let store = Arc::new(InMemoryCacheStore::new());
        let tasks = WriteBackTasks::new();
        let fetcher = PricingFetcher::new(source, store.clone(), tasks.clone(), Duration::from_secs(60));
        let key = CacheKey::part_facet(PartId::new(11000), FacetKind::Pricing);

        fetcher.fetch(PartId::new(11000)).await.unwrap();
        tasks.invalidated(&key);
        tasks.flush().await;
        assert!(!store.contains(&key));

        fetcher.fetch(PartId::new(11000)).await.unwrap();
        tasks.flush().await;
        assert!(store.contains(&key));
    }

    #[test]
    fn test_standard_fetchers_cover_every_facet() {
        let fetchers = standard_fetchers(
            catalog(),
            Arc::new(InMemoryCacheStore::new()),
            WriteBackTasks::new(),
            &CatalogConfig::default(),
        );
        let facets: Vec<FacetKind> = fetchers.iter().map(|f| f.facet()).collect();
        assert_eq!(facets, FacetKind::PART_FACETS.to_vec());
    }
}
