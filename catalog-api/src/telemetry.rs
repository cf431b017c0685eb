//! Tracing subscriber setup.

use catalog_core::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ApiConfig;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "catalog_api=debug,catalog_storage=info,info";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// JSON log lines instead of the human format.
    pub json: bool,
    /// Filter directives used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl From<&ApiConfig> for TelemetryConfig {
    fn from(config: &ApiConfig) -> Self {
        Self {
            json: config.log_json,
            ..Self::default()
        }
    }
}

/// Install the global tracing subscriber.
///
/// Should be called once at startup. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| ConfigError::InvalidValue {
            field: "default_filter".to_string(),
            value: config.default_filter.clone(),
            reason: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| ConfigError::InvalidValue {
        field: "subscriber".to_string(),
        value: "global".to_string(),
        reason: e.to_string(),
    })?;

    tracing::info!(json = config.json, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api_config() {
        let api = ApiConfig {
            log_json: true,
            ..ApiConfig::default()
        };
        let telemetry = TelemetryConfig::from(&api);
        assert!(telemetry.json);
        assert_eq!(telemetry.default_filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::default();
        // Another test in this binary may have installed a subscriber first.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
