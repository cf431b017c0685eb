//! Environment configuration for the catalog engine.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use catalog_core::{CatalogConfig, CatalogResult, ConfigError, FacetKind};
use catalog_storage::{CacheStore, InMemoryCacheStore, LmdbCacheStore};

/// Default LMDB map size.
const DEFAULT_CACHE_MAX_MB: usize = 256;

/// Largest accepted LMDB map size (1 TiB).
const MAX_CACHE_MAX_MB: usize = 1024 * 1024;

/// Engine configuration read from `CATALOG_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub catalog: CatalogConfig,
    /// LMDB directory. In-memory cache when unset.
    pub cache_path: Option<PathBuf>,
    pub cache_max_mb: usize,
    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            cache_path: None,
            cache_max_mb: DEFAULT_CACHE_MAX_MB,
            log_json: false,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CATALOG_PART_TTL_SECS`: TTL of assembled part records (default: 86400)
    /// - `CATALOG_PRICING_TTL_SECS`: TTL of the pricing facet record (default: 86400)
    /// - `CATALOG_PRICE_TTL_SECS`: TTL of single price records (default: 86400)
    /// - `CATALOG_FACET_TIMEOUT_MS`: per-facet deadline (default: 2000)
    /// - `CATALOG_CONTEXT_TIMEOUT_MS`: customer binding deadline (default: 2000)
    /// - `CATALOG_STRICT_EMPTY_FACETS`: comma-separated facets that require rows
    /// - `CATALOG_CACHE_PATH`: LMDB directory (default: in-memory cache)
    /// - `CATALOG_CACHE_MAX_MB`: LMDB map size (default: 256)
    /// - `CATALOG_LOG_JSON`: "true"/"1" for JSON logs (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CatalogConfig::default();
        let secs = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_var::<u64>(&lookup, name)?
                .map(Duration::from_secs)
                .unwrap_or(default))
        };
        let millis = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_var::<u64>(&lookup, name)?
                .map(Duration::from_millis)
                .unwrap_or(default))
        };

        let mut catalog = CatalogConfig::new()
            .with_part_ttl(secs("CATALOG_PART_TTL_SECS", defaults.part_ttl)?)
            .with_pricing_ttl(secs("CATALOG_PRICING_TTL_SECS", defaults.pricing_ttl)?)
            .with_price_ttl(secs("CATALOG_PRICE_TTL_SECS", defaults.price_ttl)?)
            .with_facet_timeout(millis("CATALOG_FACET_TIMEOUT_MS", defaults.facet_timeout)?)
            .with_context_timeout(millis(
                "CATALOG_CONTEXT_TIMEOUT_MS",
                defaults.context_timeout,
            )?);

        if let Some(list) = lookup("CATALOG_STRICT_EMPTY_FACETS") {
            catalog.strict_empty_facets = parse_facets(&list)?;
        }

        let cache_path = lookup("CATALOG_CACHE_PATH")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let cache_max_mb =
            parse_var::<usize>(&lookup, "CATALOG_CACHE_MAX_MB")?.unwrap_or(DEFAULT_CACHE_MAX_MB);

        let log_json = lookup("CATALOG_LOG_JSON")
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);

        let config = Self {
            catalog,
            cache_path,
            cache_max_mb,
            log_json,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(catalog_core::CatalogError::Config(e)) = self.catalog.validate() {
            return Err(e);
        }
        if self.cache_max_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CATALOG_CACHE_MAX_MB".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.cache_max_mb > MAX_CACHE_MAX_MB {
            return Err(ConfigError::InvalidValue {
                field: "CATALOG_CACHE_MAX_MB".to_string(),
                value: self.cache_max_mb.to_string(),
                reason: format!("must be at most {MAX_CACHE_MAX_MB}"),
            });
        }
        Ok(())
    }

    /// Open the configured cache store: LMDB when a path is set, in-memory
    /// otherwise.
    pub fn cache_store(&self) -> CatalogResult<Arc<dyn CacheStore>> {
        match &self.cache_path {
            Some(path) => {
                let store = LmdbCacheStore::new(path, self.cache_max_mb)?;
                tracing::info!(path = %path.display(), "Using LMDB cache store");
                Ok(Arc::new(store))
            }
            None => {
                tracing::info!("Using in-memory cache store");
                Ok(Arc::new(InMemoryCacheStore::new()))
            }
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

/// Parse a comma-separated facet list. Blank entries are skipped.
pub fn parse_facets(list: &str) -> Result<BTreeSet<FacetKind>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            name.parse::<FacetKind>()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: "CATALOG_STRICT_EMPTY_FACETS".to_string(),
                    value: name.to_string(),
                    reason,
                })
        })
        .collect()
}
