//! Fan-out / fan-in part assembly
//!
//! Every facet fetch runs as its own task under a per-facet deadline. The
//! results are funneled back through one loop, which is the only writer of
//! the part and of the aggregate error, so completion order does not matter.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{
    AggregateError, CatalogConfig, CatalogError, CatalogResult, FacetError, FacetErrorKind,
    FacetKind, FacetValue, Part, PartId,
};
use catalog_storage::{Assembled, CacheStore, DataSource, EntitySource, WriteBackTasks};
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::fetchers::{standard_fetchers, FacetFetcher};

type FacetOutcome = (FacetKind, Result<FacetValue, FacetError>);

/// Assembles parts from a fixed set of facet fetchers.
pub struct Coordinator {
    fetchers: Vec<Arc<dyn FacetFetcher>>,
    config: Arc<CatalogConfig>,
}

impl Coordinator {
    pub fn new(fetchers: Vec<Arc<dyn FacetFetcher>>, config: Arc<CatalogConfig>) -> Self {
        Self { fetchers, config }
    }

    /// Coordinator over the standard fetcher set.
    pub fn standard(
        source: Arc<dyn DataSource>,
        store: Arc<dyn CacheStore>,
        tasks: WriteBackTasks,
        config: Arc<CatalogConfig>,
    ) -> Self {
        let fetchers = standard_fetchers(source, store, tasks, &config);
        Self::new(fetchers, config)
    }

    pub fn facets(&self) -> Vec<FacetKind> {
        self.fetchers.iter().map(|f| f.facet()).collect()
    }

    /// Fetch every facet of `part_id` concurrently and merge the results.
    ///
    /// Facet failures are recorded in the returned aggregate and leave their
    /// slot `Failed`. A basics fetch that finds no active part ends the
    /// assembly with `NotFound` and cancels the remaining fetches.
    pub async fn assemble(&self, part_id: PartId) -> CatalogResult<Assembled<Part>> {
        let deadline = self.config.facet_timeout;
        let mut pending: BTreeSet<FacetKind> = BTreeSet::new();
        let mut tasks: JoinSet<FacetOutcome> = JoinSet::new();

        for fetcher in &self.fetchers {
            let fetcher = Arc::clone(fetcher);
            pending.insert(fetcher.facet());
            tasks.spawn(fetch_with_deadline(fetcher, part_id, deadline));
        }

        let mut part = Part::new(part_id);
        let mut failures = AggregateError::new();

        while let Some(joined) = tasks.join_next().await {
            let (facet, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!(part_id = %part_id, error = %e, "Facet task cancelled");
                    continue;
                }
            };
            pending.remove(&facet);

            match outcome {
                Ok(value) => {
                    if value.row_count() == 0 && self.config.is_strict_empty(facet) {
                        failures.record(FacetError::no_rows(facet, part_id));
                    }
                    part.apply(value);
                }
                Err(err) if facet == FacetKind::Basics && err.kind == FacetErrorKind::NoRows => {
                    tracing::debug!(part_id = %part_id, reason = %err.message, "Part not found");
                    // Dropping the set aborts the fetches still running.
                    return Err(CatalogError::part_not_found(part_id));
                }
                Err(err) => {
                    tracing::warn!(
                        part_id = %part_id,
                        facet = %facet,
                        error = %err,
                        "Facet fetch failed"
                    );
                    part.mark_failed(facet);
                    failures.record(err);
                }
            }
        }

        for facet in pending {
            part.mark_failed(facet);
            failures.record(FacetError::new(
                facet,
                FacetErrorKind::Query,
                "fetch task did not complete",
            ));
        }

        if !failures.is_empty() {
            tracing::debug!(part_id = %part_id, failed = failures.len(), "Assembled partial part");
        }
        Ok(Assembled::partial(part, failures))
    }
}

async fn fetch_with_deadline(
    fetcher: Arc<dyn FacetFetcher>,
    part_id: PartId,
    deadline: Duration,
) -> FacetOutcome {
    let facet = fetcher.facet();
    let fetch = AssertUnwindSafe(fetcher.fetch(part_id)).catch_unwind();
    let outcome = match timeout(deadline, fetch).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(FacetError::new(
            facet,
            FacetErrorKind::Query,
            "fetcher panicked",
        )),
        Err(_) => Err(FacetError::timeout(facet, deadline)),
    };
    (facet, outcome)
}

#[async_trait]
impl EntitySource<Part> for Coordinator {
    async fn load(&self, id: PartId) -> CatalogResult<Assembled<Part>> {
        self.assemble(id).await
    }
}
