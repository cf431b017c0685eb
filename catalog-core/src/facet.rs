//! Facet slots
//!
//! Every facet of a [`crate::Part`] lives in a [`Facet`] slot, so a reader
//! can always tell "never fetched" and "fetch failed" apart from "fetched,
//! the source has none".

use serde::{Deserialize, Serialize};

use crate::FacetState;

/// Slot holding one facet value of an assembled entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Facet<T> {
    /// Not attempted yet.
    Unfetched,
    /// Attempted and failed.
    Failed,
    /// Fetched. A `Loaded(vec![])` collection means the source has none.
    Loaded(T),
}

impl<T> Default for Facet<T> {
    fn default() -> Self {
        Facet::Unfetched
    }
}

impl<T> Facet<T> {
    /// True once a fetch has been attempted, successfully or not.
    pub fn is_attempted(&self) -> bool {
        !matches!(self, Facet::Unfetched)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Facet::Loaded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Facet::Failed)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Facet::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Facet::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> Facet<Vec<T>> {
    /// Items of a loaded collection facet, empty otherwise.
    pub fn items(&self) -> &[T] {
        match self {
            Facet::Loaded(items) => items,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn state(&self) -> FacetState {
        match self {
            Facet::Unfetched => FacetState::Unfetched,
            Facet::Failed => FacetState::Failed,
            Facet::Loaded(items) if items.is_empty() => FacetState::Empty,
            Facet::Loaded(_) => FacetState::Populated,
        }
    }
}
