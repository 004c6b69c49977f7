use serde::Serialize;

use crate::config::GovernedTags;
use crate::id::EntityId;
use crate::model::{SourceRecord, Tags};
use crate::reconcile::governed_values;

/// Review tags on created features. Upper case so they stand out and are
/// removed by the reviewer before upload.
pub const MUNICIPALITY_TAG: &str = "MUNICIPALITY";
pub const SUBAREAS_TAG: &str = "SUBAREAS";
pub const PLACE_TYPE_TAG: &str = "SSR";
pub const NOT_FOUND_TAG: &str = "NOT_FOUND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementQuality {
    /// Found by the settlement's own name.
    Exact,
    /// Only the municipality could be found.
    Municipality,
    /// Nothing found; coordinates are a placeholder.
    NotFound,
}

/// Where a new feature goes, as decided by the geocoding collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub lat: f64,
    pub lon: f64,
    /// Municipality the lookup succeeded in.
    pub municipality: Option<String>,
    /// Place type reported by the lookup.
    pub place_type: Option<String>,
    pub quality: PlacementQuality,
}

impl Placement {
    pub fn not_found() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            municipality: None,
            place_type: None,
            quality: PlacementQuality::NotFound,
        }
    }

    pub fn needs_check(&self) -> bool {
        self.quality != PlacementQuality::Exact
    }
}

/// A feature to be added to the reference dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeature {
    pub id: EntityId,
    pub placement: Placement,
    pub tags: Tags,
}

/// Build the new feature for an unmatched source record.
pub fn new_feature(
    record: &SourceRecord,
    key: &str,
    governed: &GovernedTags,
    placement: Placement,
) -> NewFeature {
    let mut tags = Tags::new();
    tags.set("name", &record.name);
    tags.set(key, record.id.code());
    for (k, v) in governed_values(record, governed) {
        tags.set(&k, &v);
    }

    if let Some(municipality) = placement.municipality.as_deref().filter(|m| !m.is_empty()) {
        tags.set(MUNICIPALITY_TAG, municipality);
    }

    if record.parent_refs.len() > 1 {
        let parts: Vec<String> = record
            .parent_refs
            .iter()
            .map(|m| format!("{} ({})", m.name, m.population))
            .collect();
        tags.set(SUBAREAS_TAG, &parts.join(";"));
    }

    if let Some(place_type) = placement.place_type.as_deref().filter(|t| !t.is_empty()) {
        tags.set(PLACE_TYPE_TAG, place_type);
    }

    if placement.quality == PlacementQuality::Municipality {
        tags.set(NOT_FOUND_TAG, "yes");
    }

    NewFeature {
        id: record.id.clone(),
        placement,
        tags,
    }
}
