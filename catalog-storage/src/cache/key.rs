//! Cache keys for catalog records.
//!
//! A key names one record kind and one numeric id, optionally narrowed to a
//! single facet of that record. The textual form is `kind:id` or
//! `kind:id:facet`, e.g. `part:11000`, `part:11000:pricing`, `pricing:42`.

use std::fmt;

use catalog_core::{EntityKind, FacetKind, PartId, PriceId};

/// Separator between key segments.
const SEPARATOR: char = ':';

/// Key of one cache record.
///
/// Constructed only through the typed constructors, so an id can never be
/// paired with a record kind it does not belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CacheKeyInner {
    kind: EntityKind,
    id: i64,
    facet: Option<FacetKind>,
}

impl CacheKey {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self {
            inner: CacheKeyInner {
                kind,
                id,
                facet: None,
            },
        }
    }

    /// `part:{id}`
    pub fn part(id: PartId) -> Self {
        Self::new(EntityKind::Part, id.get())
    }

    /// `part:{id}:{facet}`
    pub fn part_facet(id: PartId, facet: FacetKind) -> Self {
        Self::part(id).with_facet(facet)
    }

    /// `pricing:{id}`
    pub fn price(id: PriceId) -> Self {
        Self::new(EntityKind::Price, id.get())
    }

    pub fn with_facet(mut self, facet: FacetKind) -> Self {
        self.inner.facet = Some(facet);
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    pub fn id(&self) -> i64 {
        self.inner.id
    }

    pub fn facet(&self) -> Option<FacetKind> {
        self.inner.facet
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse the textual form back into a key.
    ///
    /// Returns `None` for unknown kinds, non-numeric ids, unknown facets or
    /// extra segments.
    pub fn decode(s: &str) -> Option<Self> {
        let mut segments = s.split(SEPARATOR);
        let kind = segments.next()?.parse::<EntityKind>().ok()?;
        let id = segments.next()?.parse::<i64>().ok()?;
        let facet = match segments.next() {
            Some(facet) => Some(facet.parse::<FacetKind>().ok()?),
            None => None,
        };
        if segments.next().is_some() {
            return None;
        }
        let key = Self::new(kind, id);
        Some(match facet {
            Some(facet) => key.with_facet(facet),
            None => key,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.inner.kind, self.inner.id)?;
        if let Some(facet) = self.inner.facet {
            write!(f, "{SEPARATOR}{facet}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(CacheKey::part(PartId::new(11000)).encode(), "part:11000");
        assert_eq!(
            CacheKey::part_facet(PartId::new(11000), FacetKind::Pricing).encode(),
            "part:11000:pricing"
        );
        assert_eq!(CacheKey::price(PriceId::new(42)).encode(), "pricing:42");
    }

    #[test]
    fn test_part_and_price_keys_differ() {
        assert_ne!(
            CacheKey::part(PartId::new(1)),
            CacheKey::price(PriceId::new(1))
        );
        assert_ne!(
            CacheKey::part(PartId::new(1)),
            CacheKey::part_facet(PartId::new(1), FacetKind::Pricing)
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(CacheKey::decode("").is_none());
        assert!(CacheKey::decode("widget:1").is_none());
        assert!(CacheKey::decode("part:abc").is_none());
        assert!(CacheKey::decode("part:1:colour").is_none());
        assert!(CacheKey::decode("part:1:pricing:extra").is_none());
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(id in any::<i64>(), facet_idx in 0usize..11) {
            let facets = [
                None,
                Some(FacetKind::Basics),
                Some(FacetKind::Attributes),
                Some(FacetKind::Pricing),
                Some(FacetKind::Reviews),
                Some(FacetKind::Images),
                Some(FacetKind::Videos),
                Some(FacetKind::Related),
                Some(FacetKind::Packaging),
                Some(FacetKind::Categories),
                Some(FacetKind::Content),
            ];
            let key = match facets[facet_idx] {
                Some(facet) => CacheKey::part_facet(PartId::new(id), facet),
                None => CacheKey::part(PartId::new(id)),
            };
            prop_assert_eq!(CacheKey::decode(&key.encode()), Some(key));
        }
    }
}
