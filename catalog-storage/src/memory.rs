//! In-memory catalog source
//!
//! Backs every source trait with plain maps. Pricing rows are served from
//! the price table so that price mutations are visible to the pricing facet.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use catalog_core::{
    CatalogResult, EntityKind, FacetKind, NewPrice, PartId, Price, PriceId, StorageError, Vehicle,
};
use chrono::Utc;

use crate::{DataSource, FacetStore, PriceStore, Row, VehicleNoteSource};

type FacetRows = HashMap<(FacetKind, PartId), Vec<Row>>;

/// In-memory implementation of [`DataSource`], [`PriceStore`],
/// [`FacetStore`] and [`VehicleNoteSource`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    rows: Arc<RwLock<FacetRows>>,
    prices: Arc<RwLock<BTreeMap<PriceId, Price>>>,
    notes: Arc<RwLock<HashMap<(Vehicle, PartId), Vec<String>>>>,
    last_price_id: Arc<AtomicI64>,
    queries: Arc<AtomicU64>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows for one statement of one part.
    pub fn insert_rows(&self, statement: FacetKind, part_id: PartId, rows: Vec<Row>) {
        if statement == FacetKind::Pricing {
            for row in rows {
                if let Ok(price) = price_from_row(part_id, &row) {
                    self.seed_price(price);
                }
            }
            return;
        }
        if let Ok(mut map) = self.rows.write() {
            map.entry((statement, part_id)).or_default().extend(rows);
        }
    }

    /// Seed a price row with a fresh id, returning the stored row.
    pub fn seed_price(&self, price: NewPrice) -> Price {
        let stored = Price {
            id: self.next_price_id(),
            part_id: price.part_id,
            price_type: price.price_type,
            price: price.price,
            enforced: price.enforced,
            date_modified: Some(Utc::now()),
        };
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(stored.id, stored.clone());
        }
        stored
    }

    pub fn insert_vehicle_notes(&self, vehicle: Vehicle, part_id: PartId, notes: Vec<String>) {
        if let Ok(mut map) = self.notes.write() {
            map.entry((vehicle, part_id)).or_default().extend(notes);
        }
    }

    /// Number of statements executed so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn price_count(&self) -> usize {
        self.prices.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Clear all data.
    pub fn clear(&self) {
        if let Ok(mut rows) = self.rows.write() {
            rows.clear();
        }
        if let Ok(mut prices) = self.prices.write() {
            prices.clear();
        }
        if let Ok(mut notes) = self.notes.write() {
            notes.clear();
        }
        self.queries.store(0, Ordering::Relaxed);
    }

    fn next_price_id(&self) -> PriceId {
        PriceId::new(self.last_price_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn pricing_rows(&self, part_id: PartId) -> CatalogResult<Vec<Row>> {
        let prices = self.prices.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut matching: Vec<&Price> = prices.values().filter(|p| p.part_id == part_id).collect();
        matching.sort_by(|a, b| a.price_type.cmp(&b.price_type).then(a.id.cmp(&b.id)));
        Ok(matching
            .into_iter()
            .map(|p| {
                Row::new()
                    .with("price_type", p.price_type.as_str())
                    .with("price", p.price)
                    .with("enforced", p.enforced)
            })
            .collect())
    }
}

fn price_from_row(part_id: PartId, row: &Row) -> Result<NewPrice, StorageError> {
    Ok(NewPrice {
        part_id,
        price_type: row.str("price_type")?,
        price: row.float("price")?,
        enforced: row.force_bool("enforced"),
    })
}

#[async_trait]
impl DataSource for InMemoryCatalog {
    async fn query_one(&self, statement: FacetKind, part_id: PartId) -> CatalogResult<Option<Row>> {
        Ok(self.query_many(statement, part_id).await?.into_iter().next())
    }

    async fn query_many(&self, statement: FacetKind, part_id: PartId) -> CatalogResult<Vec<Row>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if statement == FacetKind::Pricing {
            return self.pricing_rows(part_id);
        }
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.get(&(statement, part_id)).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl VehicleNoteSource for InMemoryCatalog {
    async fn vehicle_notes(&self, vehicle: &Vehicle, part_id: PartId) -> CatalogResult<Vec<String>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let notes = self.notes.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(notes
            .get(&(vehicle.clone(), part_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl PriceStore for InMemoryCatalog {
    async fn price_get(&self, id: PriceId) -> CatalogResult<Option<Price>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let prices = self.prices.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(prices.get(&id).cloned())
    }

    async fn price_insert(&self, price: &NewPrice) -> CatalogResult<Price> {
        if price.price_type.trim().is_empty() {
            return Err(StorageError::InsertFailed {
                kind: EntityKind::Price,
                reason: "price type is required".to_string(),
            }
            .into());
        }
        if self.prices.read().is_err() {
            return Err(StorageError::LockPoisoned.into());
        }
        Ok(self.seed_price(price.clone()))
    }

    async fn price_update(&self, price: &Price) -> CatalogResult<Option<Price>> {
        let mut prices = self.prices.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(existing) = prices.get_mut(&price.id) else {
            return Ok(None);
        };
        let previous = existing.clone();
        *existing = Price {
            date_modified: Some(Utc::now()),
            ..price.clone()
        };
        Ok(Some(previous))
    }

    async fn price_delete(&self, id: PriceId) -> CatalogResult<Option<Price>> {
        let mut prices = self.prices.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(prices.remove(&id))
    }
}

#[async_trait]
impl FacetStore for InMemoryCatalog {
    async fn replace_rows(
        &self,
        statement: FacetKind,
        part_id: PartId,
        rows: Vec<Row>,
    ) -> CatalogResult<()> {
        if statement == FacetKind::Pricing {
            // Decode everything before touching the table.
            let replacements = rows
                .iter()
                .map(|row| price_from_row(part_id, row))
                .collect::<Result<Vec<_>, _>>()?;
            {
                let mut prices = self.prices.write().map_err(|_| StorageError::LockPoisoned)?;
                prices.retain(|_, p| p.part_id != part_id);
            }
            for price in replacements {
                self.seed_price(price);
            }
            return Ok(());
        }

        let mut map = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        if rows.is_empty() {
            map.remove(&(statement, part_id));
        } else {
            map.insert((statement, part_id), rows);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
