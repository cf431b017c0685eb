//! Request-level part reads
//!
//! [`PartAssembler`] is what a handler calls: it runs the cache-aside read
//! of the shared part and the customer binding concurrently and merges them
//! into an [`AssembledPart`].

use std::sync::Arc;

use catalog_core::{
    AggregateError, CallerKey, CatalogConfig, CatalogResult, CustomerContext, FacetError,
    FacetErrorKind, FacetKind, Part, PartId, Vehicle,
};
use catalog_storage::{CacheAside, VehicleNoteSource, WriteBackTasks};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::timeout;

use crate::binder::CustomerBinder;
use crate::coordinator::Coordinator;

/// A shared part merged with one caller's context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledPart {
    pub part: Part,
    pub customer: CustomerContext,
    /// Fitment notes, present only for vehicle-scoped reads that succeeded.
    pub vehicle_notes: Option<Vec<String>>,
    /// Facet failures of the pass that produced `part`.
    pub failures: AggregateError,
    pub from_cache: bool,
}

impl AssembledPart {
    /// True when at least one facet failed.
    pub fn partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn error(&self) -> Option<&AggregateError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(&self.failures)
        }
    }
}

pub struct PartAssembler {
    cache: CacheAside<Part>,
    coordinator: Arc<Coordinator>,
    binder: CustomerBinder,
    notes: Option<Arc<dyn VehicleNoteSource>>,
    config: Arc<CatalogConfig>,
}

impl PartAssembler {
    pub fn new(
        cache: CacheAside<Part>,
        coordinator: Arc<Coordinator>,
        binder: CustomerBinder,
        config: Arc<CatalogConfig>,
    ) -> Self {
        Self {
            cache,
            coordinator,
            binder,
            notes: None,
            config,
        }
    }

    pub fn with_vehicle_notes(mut self, notes: Arc<dyn VehicleNoteSource>) -> Self {
        self.notes = Some(notes);
        self
    }

    pub fn cache(&self) -> &CacheAside<Part> {
        &self.cache
    }

    pub fn write_backs(&self) -> &WriteBackTasks {
        self.cache.tasks()
    }

    /// Read a part for `caller`.
    ///
    /// `NotFound` wins over a binding failure; a binding failure fails the
    /// request even if the part was assembled.
    pub async fn get(&self, part_id: PartId, caller: &CallerKey) -> CatalogResult<AssembledPart> {
        let (read, bound) = tokio::join!(
            self.cache.get(part_id, self.coordinator.as_ref()),
            self.binder.bind(part_id, caller),
        );

        let read = read?;
        let customer = bound?;
        let from_cache = read.was_cache_hit();
        let (part, failures) = read.into_parts();

        Ok(AssembledPart {
            part,
            customer,
            vehicle_notes: None,
            failures: failures.unwrap_or_default(),
            from_cache,
        })
    }

    /// [`Self::get`] plus fitment notes for `vehicle`.
    ///
    /// A notes failure is recorded with the facet failures and does not fail
    /// the request.
    pub async fn get_with_vehicle(
        &self,
        part_id: PartId,
        caller: &CallerKey,
        vehicle: &Vehicle,
    ) -> CatalogResult<AssembledPart> {
        let (assembled, notes) = tokio::join!(
            self.get(part_id, caller),
            self.vehicle_notes(vehicle, part_id),
        );

        let mut assembled = assembled?;
        match notes {
            Ok(notes) => assembled.vehicle_notes = Some(notes),
            Err(failure) => {
                tracing::warn!(part_id = %part_id, error = %failure, "Vehicle notes unavailable");
                assembled.failures.record(failure);
            }
        }
        Ok(assembled)
    }

    /// Read several parts for one caller. Results are independent and come
    /// back in input order.
    pub async fn get_many(
        &self,
        part_ids: &[PartId],
        caller: &CallerKey,
    ) -> Vec<(PartId, CatalogResult<AssembledPart>)> {
        let reads = part_ids.iter().map(|&id| async move { (id, self.get(id, caller).await) });
        join_all(reads).await
    }

    /// Stop accepting write-backs and wait for the in-flight ones.
    pub async fn shutdown(&self) -> usize {
        let drained = self.cache.tasks().drain().await;
        tracing::info!(drained, "Part assembler shut down");
        drained
    }

    async fn vehicle_notes(&self, vehicle: &Vehicle, part_id: PartId) -> Result<Vec<String>, FacetError> {
        let facet = FacetKind::VehicleNotes;
        let Some(source) = &self.notes else {
            return Err(FacetError::new(
                facet,
                FacetErrorKind::Query,
                "no vehicle note source configured",
            ));
        };

        let deadline = self.config.facet_timeout;
        match timeout(deadline, source.vehicle_notes(vehicle, part_id)).await {
            Ok(Ok(notes)) => Ok(notes),
            Ok(Err(e)) => Err(FacetError::new(facet, FacetErrorKind::Query, e.to_string())),
            Err(_) => Err(FacetError::timeout(facet, deadline)),
        }
    }
}
