//! Catalog API - Part Assembly Engine
//!
//! Read path:
//! - [`fetchers`]: one [`FacetFetcher`] per part facet
//! - [`coordinator`]: concurrent fan-out with per-facet deadlines
//! - [`binder`]: caller-scoped price and cart context
//! - [`assembler`]: cache-aside read of the shared part merged with the
//!   caller's context
//!
//! Write path: [`writer::CatalogWriter`] mutates prices and facet rows and
//! invalidates every cache record derived from them.
//!
//! [`engine::CatalogEngine`] wires both paths over one cache store and one
//! write-back group.

pub mod assembler;
pub mod binder;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod fetchers;
pub mod telemetry;
pub mod writer;

pub use assembler::{AssembledPart, PartAssembler};
pub use binder::{CustomerBinder, CustomerContextProvider};
pub use config::ApiConfig;
pub use coordinator::Coordinator;
pub use engine::{CatalogEngine, Collaborators};
pub use fetchers::{
    decode_facet, standard_fetchers, BasicsFetcher, FacetFetcher, PricingFetcher, RowsFetcher,
};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use writer::CatalogWriter;
