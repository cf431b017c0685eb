//! Core entity structures

use serde::{Deserialize, Serialize};

use crate::{Facet, FacetKind, FacetState, PartId, PriceId, Timestamp};

/// Scalar fields of a part, fetched by the basics facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartBasics {
    pub status: i32,
    pub date_added: Option<Timestamp>,
    pub date_modified: Option<Timestamp>,
    pub short_desc: String,
    pub price_code: i32,
    pub part_class: String,
}

/// Free-form key/value attribute (e.g. "Finish" = "Black").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

/// Typed text block (marketing copy, notes, bullet points).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub key: String,
    pub value: String,
}

/// Public price point of a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub price_type: String,
    pub price: f64,
    pub enforced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub rating: i32,
    pub subject: String,
    pub review_text: String,
    pub name: String,
    pub email: String,
    pub created_date: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub size: String,
    pub sort: String,
    pub height: i32,
    pub width: i32,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub youtube_id: String,
    pub title: String,
    pub video_type: String,
    pub is_primary: bool,
}

/// Shipping package dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub height: f64,
    pub width: f64,
    pub length: f64,
    pub weight: f64,
    pub dimension_unit: String,
    pub weight_unit: String,
    pub package_unit: String,
    pub quantity: i32,
}

/// One level of the category breadcrumb, root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCrumb {
    pub category_id: i64,
    pub parent_id: Option<i64>,
    pub title: String,
    pub short_desc: String,
}

/// Value produced by one facet fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FacetValue {
    Basics(PartBasics),
    Attributes(Vec<Attribute>),
    Pricing(Vec<Pricing>),
    Reviews(Vec<Review>),
    Images(Vec<Image>),
    Videos(Vec<Video>),
    Related(Vec<PartId>),
    Packaging(Vec<Package>),
    Categories(Vec<CategoryCrumb>),
    Content {
        blocks: Vec<ContentBlock>,
        install_sheet: Option<String>,
    },
}

impl FacetValue {
    pub fn kind(&self) -> FacetKind {
        match self {
            FacetValue::Basics(_) => FacetKind::Basics,
            FacetValue::Attributes(_) => FacetKind::Attributes,
            FacetValue::Pricing(_) => FacetKind::Pricing,
            FacetValue::Reviews(_) => FacetKind::Reviews,
            FacetValue::Images(_) => FacetKind::Images,
            FacetValue::Videos(_) => FacetKind::Videos,
            FacetValue::Related(_) => FacetKind::Related,
            FacetValue::Packaging(_) => FacetKind::Packaging,
            FacetValue::Categories(_) => FacetKind::Categories,
            FacetValue::Content { .. } => FacetKind::Content,
        }
    }

    /// Number of rows backing this value. Basics always counts as one.
    pub fn row_count(&self) -> usize {
        match self {
            FacetValue::Basics(_) => 1,
            FacetValue::Attributes(v) => v.len(),
            FacetValue::Pricing(v) => v.len(),
            FacetValue::Reviews(v) => v.len(),
            FacetValue::Images(v) => v.len(),
            FacetValue::Videos(v) => v.len(),
            FacetValue::Related(v) => v.len(),
            FacetValue::Packaging(v) => v.len(),
            FacetValue::Categories(v) => v.len(),
            FacetValue::Content {
                blocks,
                install_sheet,
            } => blocks.len() + usize::from(install_sheet.is_some()),
        }
    }
}

/// Composite catalog record assembled from independent facets.
///
/// This is the shared, cacheable projection of a part. Caller-specific data
/// (customer price, cart reference) is never a field here; the binder
/// attaches it next to the part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub part_id: PartId,
    pub basics: Facet<PartBasics>,
    pub attributes: Facet<Vec<Attribute>>,
    pub pricing: Facet<Vec<Pricing>>,
    pub reviews: Facet<Vec<Review>>,
    /// Truncated integer mean of review ratings, 0 without reviews.
    pub average_review: f64,
    pub images: Facet<Vec<Image>>,
    pub videos: Facet<Vec<Video>>,
    pub related: Facet<Vec<PartId>>,
    pub related_count: usize,
    pub packages: Facet<Vec<Package>>,
    pub categories: Facet<Vec<CategoryCrumb>>,
    pub content: Facet<Vec<ContentBlock>>,
    pub install_sheet: Option<String>,
}

impl Part {
    /// Empty part with every facet unfetched.
    pub fn new(part_id: PartId) -> Self {
        Self {
            part_id,
            basics: Facet::Unfetched,
            attributes: Facet::Unfetched,
            pricing: Facet::Unfetched,
            reviews: Facet::Unfetched,
            average_review: 0.0,
            images: Facet::Unfetched,
            videos: Facet::Unfetched,
            related: Facet::Unfetched,
            related_count: 0,
            packages: Facet::Unfetched,
            categories: Facet::Unfetched,
            content: Facet::Unfetched,
            install_sheet: None,
        }
    }

    /// Write a fetched facet value into its slot, updating derived fields.
    pub fn apply(&mut self, value: FacetValue) {
        match value {
            FacetValue::Basics(basics) => self.basics = Facet::Loaded(basics),
            FacetValue::Attributes(attrs) => self.attributes = Facet::Loaded(attrs),
            FacetValue::Pricing(prices) => self.pricing = Facet::Loaded(prices),
            FacetValue::Reviews(reviews) => {
                self.average_review = average_rating(&reviews);
                self.reviews = Facet::Loaded(reviews);
            }
            FacetValue::Images(images) => self.images = Facet::Loaded(images),
            FacetValue::Videos(videos) => self.videos = Facet::Loaded(videos),
            FacetValue::Related(related) => {
                self.related_count = related.len();
                self.related = Facet::Loaded(related);
            }
            FacetValue::Packaging(packages) => self.packages = Facet::Loaded(packages),
            FacetValue::Categories(crumbs) => self.categories = Facet::Loaded(crumbs),
            FacetValue::Content {
                blocks,
                install_sheet,
            } => {
                self.install_sheet = install_sheet;
                self.content = Facet::Loaded(blocks);
            }
        }
    }

    /// Record that the fetch for `kind` was attempted and failed.
    pub fn mark_failed(&mut self, kind: FacetKind) {
        match kind {
            FacetKind::Basics => self.basics = Facet::Failed,
            FacetKind::Attributes => self.attributes = Facet::Failed,
            FacetKind::Pricing => self.pricing = Facet::Failed,
            FacetKind::Reviews => self.reviews = Facet::Failed,
            FacetKind::Images => self.images = Facet::Failed,
            FacetKind::Videos => self.videos = Facet::Failed,
            FacetKind::Related => self.related = Facet::Failed,
            FacetKind::Packaging => self.packages = Facet::Failed,
            FacetKind::Categories => self.categories = Facet::Failed,
            FacetKind::Content => self.content = Facet::Failed,
            FacetKind::VehicleNotes => {}
        }
    }

    pub fn facet_state(&self, kind: FacetKind) -> FacetState {
        match kind {
            FacetKind::Basics => match &self.basics {
                Facet::Unfetched => FacetState::Unfetched,
                Facet::Failed => FacetState::Failed,
                Facet::Loaded(_) => FacetState::Populated,
            },
            FacetKind::Attributes => self.attributes.state(),
            FacetKind::Pricing => self.pricing.state(),
            FacetKind::Reviews => self.reviews.state(),
            FacetKind::Images => self.images.state(),
            FacetKind::Videos => self.videos.state(),
            FacetKind::Related => self.related.state(),
            FacetKind::Packaging => self.packages.state(),
            FacetKind::Categories => self.categories.state(),
            FacetKind::Content => self.content.state(),
            FacetKind::VehicleNotes => FacetState::Unfetched,
        }
    }

    /// True when every part facet has been attempted at least once.
    pub fn is_fully_assembled(&self) -> bool {
        FacetKind::PART_FACETS
            .iter()
            .all(|kind| self.facet_state(*kind) != FacetState::Unfetched)
    }
}

fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    (total / reviews.len() as i64) as f64
}

/// Row of the price table, addressable by its own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: PriceId,
    pub part_id: PartId,
    pub price_type: String,
    pub price: f64,
    pub enforced: bool,
    pub date_modified: Option<Timestamp>,
}

/// Payload for creating a price row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrice {
    pub part_id: PartId,
    pub price_type: String,
    pub price: f64,
    pub enforced: bool,
}

/// Caller-private projection attached to a part at request time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerContext {
    pub price: f64,
    pub cart_reference: i64,
}
