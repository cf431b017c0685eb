//! Configuration types

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CatalogResult, ConfigError, FacetKind};

/// Part statuses that count as "exists" for the basics facet.
pub const DEFAULT_ACTIVE_STATUSES: [i32; 2] = [800, 900];

/// One day, the TTL every cache record gets unless configured otherwise.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(86_400);

/// Tunables of the assembly engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// TTL of a fully assembled part record (`part:{id}`).
    pub part_ttl: Duration,
    /// TTL of the pricing facet's own cache (`part:{id}:pricing`).
    pub pricing_ttl: Duration,
    /// TTL of single price rows (`pricing:{id}`).
    pub price_ttl: Duration,
    /// Deadline for each facet fetch.
    pub facet_timeout: Duration,
    /// Deadline for binding the customer context.
    pub context_timeout: Duration,
    /// Facets for which zero rows is reported as a `NoRows` failure.
    pub strict_empty_facets: BTreeSet<FacetKind>,
    /// Statuses a part must have to be visible.
    pub active_statuses: Vec<i32>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            part_ttl: DEFAULT_RECORD_TTL,
            pricing_ttl: DEFAULT_RECORD_TTL,
            price_ttl: DEFAULT_RECORD_TTL,
            facet_timeout: Duration::from_secs(2),
            context_timeout: Duration::from_secs(2),
            strict_empty_facets: BTreeSet::new(),
            active_statuses: DEFAULT_ACTIVE_STATUSES.to_vec(),
        }
    }
}

impl CatalogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_part_ttl(mut self, ttl: Duration) -> Self {
        self.part_ttl = ttl;
        self
    }

    pub fn with_pricing_ttl(mut self, ttl: Duration) -> Self {
        self.pricing_ttl = ttl;
        self
    }

    pub fn with_price_ttl(mut self, ttl: Duration) -> Self {
        self.price_ttl = ttl;
        self
    }

    pub fn with_facet_timeout(mut self, timeout: Duration) -> Self {
        self.facet_timeout = timeout;
        self
    }

    pub fn with_context_timeout(mut self, timeout: Duration) -> Self {
        self.context_timeout = timeout;
        self
    }

    pub fn with_strict_empty(mut self, facet: FacetKind) -> Self {
        self.strict_empty_facets.insert(facet);
        self
    }

    pub fn with_active_statuses(mut self, statuses: Vec<i32>) -> Self {
        self.active_statuses = statuses;
        self
    }

    pub fn is_strict_empty(&self, facet: FacetKind) -> bool {
        self.strict_empty_facets.contains(&facet)
    }

    pub fn is_active_status(&self, status: i32) -> bool {
        self.active_statuses.contains(&status)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - every TTL and deadline is non-zero
    /// - at least one active status is configured
    /// - basics is not a strict-empty facet (a missing part is NotFound)
    pub fn validate(&self) -> CatalogResult<()> {
        let durations = [
            ("part_ttl", self.part_ttl),
            ("pricing_ttl", self.pricing_ttl),
            ("price_ttl", self.price_ttl),
            ("facet_timeout", self.facet_timeout),
            ("context_timeout", self.context_timeout),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{value:?}"),
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
        }

        if self.active_statuses.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "active_statuses".to_string(),
            }
            .into());
        }

        if self.strict_empty_facets.contains(&FacetKind::Basics) {
            return Err(ConfigError::InvalidValue {
                field: "strict_empty_facets".to_string(),
                value: FacetKind::Basics.to_string(),
                reason: "a part without basics is not found, not empty".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
