use std::collections::{BTreeMap, BTreeSet};

use crate::error::ReconError;
use crate::id::EntityId;
use crate::model::{MatchResult, ReferenceFeature, SourceSet};
use crate::report::{RunReport, Warning};

/// Fail if any identifier occurs on more than one feature.
///
/// Runs before anything is mutated so a bad reference dataset never yields a
/// partially reconciled output.
pub fn check_duplicates(features: &[ReferenceFeature]) -> Result<(), ReconError> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for feature in features {
        if !seen.insert(&feature.id) {
            duplicates.insert(feature.id.clone());
        }
    }

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(ReconError::DuplicateReference(duplicates.into_iter().collect()))
    }
}

/// Partition source ids and feature ids into matched, source-only and
/// reference-only.
///
/// Every id lands in exactly one partition. Misses on either side are
/// recorded as warnings in `report`.
pub fn match_by_id(
    source: &SourceSet,
    features: &[ReferenceFeature],
    report: &mut RunReport,
) -> Result<MatchResult, ReconError> {
    check_duplicates(features)?;

    let mut pending: BTreeSet<&EntityId> = source.ids().collect();
    let mut matched = BTreeMap::new();
    let mut unmatched_reference = BTreeMap::new();

    for (index, feature) in features.iter().enumerate() {
        if pending.remove(&feature.id) {
            matched.insert(feature.id.clone(), index);
        } else {
            unmatched_reference.insert(feature.id.clone(), index);
        }
    }

    for id in unmatched_reference.keys() {
        report.warn(Warning::NotInSource { id: id.clone() });
    }

    let unmatched_source: Vec<EntityId> = pending.into_iter().cloned().collect();

    Ok(MatchResult {
        matched,
        unmatched_source,
        unmatched_reference,
    })
}
