//! Catalog Core - Part and Facet Types
//!
//! Pure data structures shared by every other crate in the workspace: the
//! assembled [`Part`], its facet records, the [`Facet`] slot that keeps
//! "unfetched", "failed" and "empty" apart, and the error taxonomy.
//! This crate contains no I/O.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod facet;
pub mod identity;

pub use config::{CatalogConfig, DEFAULT_ACTIVE_STATUSES, DEFAULT_RECORD_TTL};
pub use entities::{
    Attribute, CategoryCrumb, ContentBlock, CustomerContext, FacetValue, Image, NewPrice, Package,
    Part, PartBasics, Price, Pricing, Review, Video,
};
pub use enums::{EntityKind, FacetKind, FacetState};
pub use error::{
    AggregateError, CacheError, CatalogError, CatalogResult, ConfigError, FacetError,
    FacetErrorKind, StorageError,
};
pub use facet::Facet;
pub use identity::{CallerKey, PartId, PriceId, Timestamp, Vehicle};
