//! Enum types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of cacheable record, used as the first segment of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Fully assembled part (`part:{id}`).
    Part,
    /// Single price row (`pricing:{id}`).
    Price,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Part => "part",
            EntityKind::Price => "pricing",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "part" => Ok(EntityKind::Part),
            "pricing" => Ok(EntityKind::Price),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// A named, independently fetchable slot of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    Basics,
    Attributes,
    Pricing,
    Reviews,
    Images,
    Videos,
    Related,
    Packaging,
    Categories,
    Content,
    /// Vehicle fitment notes. Context-scoped, never part of a cached [`crate::Part`].
    VehicleNotes,
}

impl FacetKind {
    /// Every facet the coordinator fetches for a part, in display order.
    pub const PART_FACETS: [FacetKind; 10] = [
        FacetKind::Basics,
        FacetKind::Attributes,
        FacetKind::Pricing,
        FacetKind::Reviews,
        FacetKind::Images,
        FacetKind::Videos,
        FacetKind::Related,
        FacetKind::Packaging,
        FacetKind::Categories,
        FacetKind::Content,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetKind::Basics => "basics",
            FacetKind::Attributes => "attributes",
            FacetKind::Pricing => "pricing",
            FacetKind::Reviews => "reviews",
            FacetKind::Images => "images",
            FacetKind::Videos => "videos",
            FacetKind::Related => "related",
            FacetKind::Packaging => "packaging",
            FacetKind::Categories => "categories",
            FacetKind::Content => "content",
            FacetKind::VehicleNotes => "vehicle_notes",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        FacetKind::PART_FACETS
            .iter()
            .chain(std::iter::once(&FacetKind::VehicleNotes))
            .find(|kind| kind.as_str() == normalized)
            .copied()
            .ok_or_else(|| format!("unknown facet: {s}"))
    }
}

/// Observable state of a facet slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetState {
    /// Never attempted.
    Unfetched,
    /// Attempted and failed; the failure is in the assembly's aggregate error.
    Failed,
    /// Fetched, the source has nothing for this part.
    Empty,
    /// Fetched with at least one value.
    Populated,
}
