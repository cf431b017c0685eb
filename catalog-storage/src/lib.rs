//! Catalog Storage - Data Source Traits, Cache Stores and Mock Implementation
//!
//! Defines the collaborator seams of the assembly engine: the per-facet
//! [`DataSource`], the mutable [`PriceStore`] / [`FacetStore`], vehicle
//! fitment notes, and the [`cache`] layer (byte stores, cache-aside reads and
//! supervised write-backs). [`InMemoryCatalog`] backs all source traits for
//! tests and local runs.

pub mod cache;
pub mod memory;
pub mod row;

use async_trait::async_trait;
use catalog_core::{CatalogResult, FacetKind, NewPrice, PartId, Price, PriceId, Vehicle};

pub use cache::{
    decode_record, encode_record, Assembled, CacheAside, CacheKey, CacheRead, CacheStats,
    CacheStore, CacheableEntity, EntitySource, Generation, InMemoryCacheStore, LmdbCacheError,
    LmdbCacheStore, ReadSource, WriteBackTasks,
};
pub use memory::InMemoryCatalog;
pub use row::{Row, Value};

// ============================================================================
// DATA SOURCE TRAITS
// ============================================================================

/// Read access to the catalog's relational source.
///
/// Each part facet maps to one named statement, selected by its
/// [`FacetKind`] and parameterized by the part id. Implementations must be
/// safe to call from many tasks at once.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run a statement expected to produce at most one row.
    async fn query_one(&self, statement: FacetKind, part_id: PartId) -> CatalogResult<Option<Row>>;

    /// Run a statement producing any number of rows, in source order.
    async fn query_many(&self, statement: FacetKind, part_id: PartId) -> CatalogResult<Vec<Row>>;
}

/// Vehicle fitment notes for a part.
#[async_trait]
pub trait VehicleNoteSource: Send + Sync {
    async fn vehicle_notes(&self, vehicle: &Vehicle, part_id: PartId) -> CatalogResult<Vec<String>>;
}

/// Writable price table.
///
/// Update and delete return the row as it was before the mutation so the
/// caller can invalidate records of the part it belonged to.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn price_get(&self, id: PriceId) -> CatalogResult<Option<Price>>;

    async fn price_insert(&self, price: &NewPrice) -> CatalogResult<Price>;

    async fn price_update(&self, price: &Price) -> CatalogResult<Option<Price>>;

    async fn price_delete(&self, id: PriceId) -> CatalogResult<Option<Price>>;
}

/// Bulk replacement of the rows behind one facet of one part.
#[async_trait]
pub trait FacetStore: Send + Sync {
    async fn replace_rows(
        &self,
        statement: FacetKind,
        part_id: PartId,
        rows: Vec<Row>,
    ) -> CatalogResult<()>;
}
