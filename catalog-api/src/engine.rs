//! Wiring of the read and write paths over shared collaborators.

use std::sync::Arc;

use catalog_core::{CatalogConfig, CatalogResult};
use catalog_storage::{
    CacheAside, CacheStore, DataSource, FacetStore, InMemoryCacheStore, InMemoryCatalog,
    PriceStore, VehicleNoteSource, WriteBackTasks,
};

use crate::assembler::PartAssembler;
use crate::binder::{CustomerBinder, CustomerContextProvider};
use crate::coordinator::Coordinator;
use crate::writer::CatalogWriter;

/// Everything the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn DataSource>,
    pub prices: Arc<dyn PriceStore>,
    pub facets: Arc<dyn FacetStore>,
    pub notes: Option<Arc<dyn VehicleNoteSource>>,
    pub customers: Arc<dyn CustomerContextProvider>,
    pub cache: Arc<dyn CacheStore>,
}

impl Collaborators {
    /// All catalog traits served by one in-memory catalog, with an
    /// in-memory cache.
    pub fn in_memory(
        catalog: Arc<InMemoryCatalog>,
        customers: Arc<dyn CustomerContextProvider>,
    ) -> Self {
        Self {
            source: catalog.clone(),
            prices: catalog.clone(),
            facets: catalog.clone(),
            notes: Some(catalog),
            customers,
            cache: Arc::new(InMemoryCacheStore::new()),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }
}

/// The assembled read path and the mutation gateway, sharing one cache
/// store and one write-back group.
pub struct CatalogEngine {
    assembler: PartAssembler,
    writer: CatalogWriter,
    tasks: WriteBackTasks,
    config: Arc<CatalogConfig>,
}

impl CatalogEngine {
    pub fn new(config: CatalogConfig, parts: Collaborators) -> CatalogResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let tasks = WriteBackTasks::new();

        let coordinator = Arc::new(Coordinator::standard(
            Arc::clone(&parts.source),
            Arc::clone(&parts.cache),
            tasks.clone(),
            Arc::clone(&config),
        ));
        let cache = CacheAside::new(Arc::clone(&parts.cache), tasks.clone(), config.part_ttl);
        let binder = CustomerBinder::new(parts.customers, config.context_timeout);

        let mut assembler = PartAssembler::new(cache, coordinator, binder, Arc::clone(&config));
        if let Some(notes) = parts.notes {
            assembler = assembler.with_vehicle_notes(notes);
        }

        let writer = CatalogWriter::new(
            parts.prices,
            parts.facets,
            parts.cache,
            tasks.clone(),
            &config,
        );

        tracing::info!(
            part_ttl_secs = config.part_ttl.as_secs(),
            facet_timeout_ms = config.facet_timeout.as_millis() as u64,
            "Catalog engine ready"
        );

        Ok(Self {
            assembler,
            writer,
            tasks,
            config,
        })
    }

    pub fn assembler(&self) -> &PartAssembler {
        &self.assembler
    }

    pub fn writer(&self) -> &CatalogWriter {
        &self.writer
    }

    pub fn write_backs(&self) -> &WriteBackTasks {
        &self.tasks
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Drain pending write-backs. Later write-backs are dropped.
    pub async fn shutdown(&self) -> usize {
        self.assembler.shutdown().await
    }
}
