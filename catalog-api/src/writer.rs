//! Mutation gateway
//!
//! Every write to catalog data goes through [`CatalogWriter`], which
//! invalidates the cache records derived from the mutated rows before it
//! returns. Invalidation is attempted for every affected key even if one
//! fails; the first failure is then reported to the caller.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use catalog_core::{
    CatalogConfig, CatalogError, CatalogResult, EntityKind, FacetKind, NewPrice, PartId, Price,
    PriceId, StorageError,
};
use catalog_storage::{
    Assembled, CacheAside, CacheKey, CacheStore, EntitySource, FacetStore, PriceStore, Row,
    WriteBackTasks,
};

/// Price table viewed as a cache-aside source.
struct PriceRows<'a> {
    store: &'a dyn PriceStore,
}

#[async_trait]
impl<'a> EntitySource<Price> for PriceRows<'a> {
    async fn load(&self, id: PriceId) -> CatalogResult<Assembled<Price>> {
        match self.store.price_get(id).await? {
            Some(price) => Ok(Assembled::complete(price)),
            None => Err(price_not_found(id)),
        }
    }
}

fn price_not_found(id: PriceId) -> CatalogError {
    CatalogError::NotFound {
        kind: EntityKind::Price,
        id: id.get(),
    }
}

/// Keys derived from the data of one part.
fn part_keys(part_id: PartId) -> [CacheKey; 2] {
    [
        CacheKey::part(part_id),
        CacheKey::part_facet(part_id, FacetKind::Pricing),
    ]
}

pub struct CatalogWriter {
    prices: Arc<dyn PriceStore>,
    facets: Arc<dyn FacetStore>,
    store: Arc<dyn CacheStore>,
    price_cache: CacheAside<Price>,
}

impl CatalogWriter {
    pub fn new(
        prices: Arc<dyn PriceStore>,
        facets: Arc<dyn FacetStore>,
        store: Arc<dyn CacheStore>,
        tasks: WriteBackTasks,
        config: &CatalogConfig,
    ) -> Self {
        let price_cache = CacheAside::new(Arc::clone(&store), tasks, config.price_ttl);
        Self {
            prices,
            facets,
            store,
            price_cache,
        }
    }

    /// Read one price row through the `pricing:{id}` cache.
    pub async fn get_price(&self, id: PriceId) -> CatalogResult<Price> {
        let source = PriceRows {
            store: self.prices.as_ref(),
        };
        Ok(self.price_cache.get(id, &source).await?.into_value())
    }

    pub async fn create_price(&self, price: NewPrice) -> CatalogResult<Price> {
        let created = self.prices.price_insert(&price).await?;
        tracing::debug!(price_id = %created.id, part_id = %created.part_id, "Price created");

        let mut keys = vec![CacheKey::price(created.id)];
        keys.extend(part_keys(created.part_id));
        self.invalidate(&keys).await?;
        Ok(created)
    }

    /// Replace a price row. Records of both the old and the new owning part
    /// are invalidated.
    pub async fn update_price(&self, price: Price) -> CatalogResult<Price> {
        let previous = self
            .prices
            .price_update(&price)
            .await?
            .ok_or_else(|| price_not_found(price.id))?;
        tracing::debug!(price_id = %price.id, part_id = %price.part_id, "Price updated");

        let mut keys: BTreeSet<CacheKey> = BTreeSet::from([CacheKey::price(price.id)]);
        keys.extend(part_keys(previous.part_id));
        keys.extend(part_keys(price.part_id));
        let keys: Vec<CacheKey> = keys.into_iter().collect();
        self.invalidate(&keys).await?;

        self.prices
            .price_get(price.id)
            .await?
            .ok_or_else(|| price_not_found(price.id))
    }

    pub async fn delete_price(&self, id: PriceId) -> CatalogResult<Price> {
        let removed = self
            .prices
            .price_delete(id)
            .await?
            .ok_or_else(|| price_not_found(id))?;
        tracing::debug!(price_id = %id, part_id = %removed.part_id, "Price deleted");

        let mut keys = vec![CacheKey::price(id)];
        keys.extend(part_keys(removed.part_id));
        self.invalidate(&keys).await?;
        Ok(removed)
    }

    /// Replace all rows behind one facet of a part.
    pub async fn replace_facet(
        &self,
        part_id: PartId,
        facet: FacetKind,
        rows: Vec<Row>,
    ) -> CatalogResult<()> {
        if facet == FacetKind::VehicleNotes {
            return Err(StorageError::QueryFailed {
                statement: facet.to_string(),
                reason: "not a part facet".to_string(),
            }
            .into());
        }

        self.facets.replace_rows(facet, part_id, rows).await?;
        tracing::debug!(part_id = %part_id, facet = %facet, "Facet rows replaced");

        if facet == FacetKind::Pricing {
            self.invalidate(&part_keys(part_id)).await
        } else {
            self.invalidate(&[CacheKey::part(part_id)]).await
        }
    }

    /// Drop every cached record derived from `part_id`.
    pub async fn invalidate_part(&self, part_id: PartId) -> CatalogResult<()> {
        self.invalidate(&part_keys(part_id)).await
    }

    /// Delete `keys` from the store. Each key's generation is bumped first,
    /// so reads that loaded before the mutation cannot write back over it.
    async fn invalidate(&self, keys: &[CacheKey]) -> CatalogResult<()> {
        let tasks = self.price_cache.tasks();
        let mut first_error = None;
        for key in keys {
            tasks.invalidated(key);
            match self.store.delete(key).await {
                Ok(removed) => tracing::trace!(key = %key, removed, "Invalidated"),
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Cache invalidation failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
