//! Error types for catalog operations

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntityKind, FacetKind, PartId};

/// Data source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Query {statement} failed: {reason}")]
    QueryFailed { statement: String, reason: String },

    #[error("Failed to decode column {column}: {reason}")]
    Decode { column: String, reason: String },

    #[error("Insert failed for {kind}: {reason}")]
    InsertFailed { kind: EntityKind, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Failed to encode {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Failed to decode {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Why a single facet fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetErrorKind {
    /// The source answered, but had no rows where some were required.
    NoRows,
    /// The query itself failed (connectivity, statement error).
    Query,
    /// Rows came back but could not be decoded.
    Decode,
    /// The fetch did not finish within its deadline.
    Timeout,
}

impl FacetErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacetErrorKind::NoRows => "no rows",
            FacetErrorKind::Query => "query failed",
            FacetErrorKind::Decode => "decode failed",
            FacetErrorKind::Timeout => "timed out",
        }
    }
}

impl fmt::Display for FacetErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one facet fetch. Non-fatal to the assembly.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{facet} {kind}: {message}")]
pub struct FacetError {
    pub facet: FacetKind,
    pub kind: FacetErrorKind,
    pub message: String,
}

impl FacetError {
    pub fn new(facet: FacetKind, kind: FacetErrorKind, message: impl Into<String>) -> Self {
        Self {
            facet,
            kind,
            message: message.into(),
        }
    }

    pub fn no_rows(facet: FacetKind, part_id: PartId) -> Self {
        Self::new(
            facet,
            FacetErrorKind::NoRows,
            format!("no {facet} found for part {part_id}"),
        )
    }

    pub fn timeout(facet: FacetKind, deadline: Duration) -> Self {
        Self::new(
            facet,
            FacetErrorKind::Timeout,
            format!("no response within {}ms", deadline.as_millis()),
        )
    }

    /// Classify a data source error raised while fetching `facet`.
    pub fn from_storage(facet: FacetKind, err: &StorageError) -> Self {
        let kind = match err {
            StorageError::Decode { .. } => FacetErrorKind::Decode,
            _ => FacetErrorKind::Query,
        };
        Self::new(facet, kind, err.to_string())
    }
}

/// Every facet failure of one assembly pass, keyed by facet.
///
/// Each facet is fetched at most once per pass, so a facet maps to at most
/// one error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateError {
    failures: BTreeMap<FacetKind, FacetError>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, error: FacetError) {
        self.failures.insert(error.facet, error);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn get(&self, facet: FacetKind) -> Option<&FacetError> {
        self.failures.get(&facet)
    }

    pub fn contains(&self, facet: FacetKind) -> bool {
        self.failures.contains_key(&facet)
    }

    pub fn facets(&self) -> impl Iterator<Item = FacetKind> + '_ {
        self.failures.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FacetError> {
        self.failures.values()
    }

    /// Merge failures from another pass; entries of `other` win on conflict.
    pub fn extend(&mut self, other: AggregateError) {
        self.failures.extend(other.failures);
    }

    /// `None` when nothing failed.
    pub fn into_result(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Error: ")?;
        for (i, failure) in self.failures.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl FromIterator<FacetError> for AggregateError {
    fn from_iter<I: IntoIterator<Item = FacetError>>(iter: I) -> Self {
        let mut aggregate = AggregateError::new();
        for error in iter {
            aggregate.record(error);
        }
        aggregate
    }
}

/// Master error type for catalog operations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind customer context for part {part_id}: {reason}")]
    ContextBind { part_id: PartId, reason: String },
}

impl CatalogError {
    pub fn part_not_found(part_id: PartId) -> Self {
        CatalogError::NotFound {
            kind: EntityKind::Part,
            id: part_id.get(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facet_error_display_names_facet() {
        let err = FacetError::timeout(FacetKind::Pricing, Duration::from_millis(250));
        let msg = err.to_string();
        assert!(msg.contains("pricing"));
        assert!(msg.contains("timed out"));
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn test_facet_error_from_storage_classifies_decode() {
        let err = StorageError::Decode {
            column: "price".to_string(),
            reason: "expected float".to_string(),
        };
        let facet = FacetError::from_storage(FacetKind::Pricing, &err);
        assert_eq!(facet.kind, FacetErrorKind::Decode);

        let err = StorageError::QueryFailed {
            statement: "pricing".to_string(),
            reason: "connection reset".to_string(),
        };
        let facet = FacetError::from_storage(FacetKind::Pricing, &err);
        assert_eq!(facet.kind, FacetErrorKind::Query);
        assert!(facet.message.contains("connection reset"));
    }

    #[test]
    fn test_aggregate_error_keeps_facet_identity() {
        let aggregate: AggregateError = [
            FacetError::no_rows(FacetKind::Related, PartId::new(7)),
            FacetError::timeout(FacetKind::Pricing, Duration::from_secs(1)),
        ]
        .into_iter()
        .collect();

        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.contains(FacetKind::Pricing));
        assert_eq!(
            aggregate.get(FacetKind::Related).map(|e| e.kind),
            Some(FacetErrorKind::NoRows)
        );
        assert_eq!(
            aggregate.facets().collect::<Vec<_>>(),
            vec![FacetKind::Pricing, FacetKind::Related]
        );
    }

    #[test]
    fn test_aggregate_error_display_joins_messages() {
        let aggregate: AggregateError = [
            FacetError::new(FacetKind::Images, FacetErrorKind::Query, "boom"),
            FacetError::new(FacetKind::Videos, FacetErrorKind::Query, "bang"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            aggregate.to_string(),
            "Error: images query failed: boom, videos query failed: bang"
        );
    }

    #[test]
    fn test_empty_aggregate_into_result_is_none() {
        assert!(AggregateError::new().into_result().is_none());
    }

    #[test]
    fn test_catalog_error_not_found_display() {
        let err = CatalogError::part_not_found(PartId::new(99999));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "part 99999 not found");
    }

    #[test]
    fn test_catalog_error_from_variants() {
        let storage = CatalogError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, CatalogError::Storage(_)));

        let cache = CatalogError::from(CacheError::Backend {
            reason: "disk full".to_string(),
        });
        assert!(matches!(cache, CatalogError::Cache(_)));

        let config = CatalogError::from(ConfigError::MissingRequired {
            field: "part_ttl".to_string(),
        });
        assert!(matches!(config, CatalogError::Config(_)));
    }
}
