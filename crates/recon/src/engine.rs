use crate::config::{GovernedTags, LevelConfig, ReconConfig};
use crate::create::{new_feature, NewFeature, Placement, PlacementQuality};
use crate::error::ReconError;
use crate::id::EntityKind;
use crate::matcher::match_by_id;
use crate::model::{MatchResult, ReferenceFeature, SourceRecord, SourceSet};
use crate::reconcile::reconcile_feature;
use crate::report::{RunReport, Warning};
use crate::split::apply_splits;

/// Result of reconciling one level.
#[derive(Debug, Clone)]
pub struct LevelOutcome {
    pub matches: MatchResult,
    pub created: Vec<NewFeature>,
}

/// Drop excluded ids and apply split rules to the source records of `level`.
pub fn prepare_source(
    config: &ReconConfig,
    level: &LevelConfig,
    mut source: SourceSet,
    report: &mut RunReport,
) -> Result<SourceSet, ReconError> {
    for id in level.excluded_ids()? {
        if source.remove(&id).is_some() {
            log::debug!("{} {id} excluded from source data", level.kind);
        }
    }

    if level.kind == EntityKind::Settlement {
        source = apply_splits(&config.split_rules()?, source, report)?;
    }

    Ok(source)
}

/// Match, reconcile and (optionally) create features for one level.
///
/// Excluded ids are removed from `features` first. A duplicate identifier
/// aborts before any feature is touched. `locate` is only called for
/// unmatched source records of levels with `create_missing`.
pub fn run_level<E, F>(
    level: &LevelConfig,
    governed: &GovernedTags,
    source: &SourceSet,
    features: &mut Vec<ReferenceFeature>,
    report: &mut RunReport,
    mut locate: F,
) -> Result<LevelOutcome, E>
where
    E: From<ReconError>,
    F: FnMut(&SourceRecord) -> Result<Placement, E>,
{
    let excluded = level.excluded_ids()?;
    features.retain(|f| !excluded.contains(&f.id));

    let matches = match_by_id(source, features, report)?;

    let mut updated = 0;
    let mut already_correct = 0;
    for (id, &index) in &matches.matched {
        let Some(record) = source.get(id) else { continue };
        if reconcile_feature(record, &mut features[index], governed) {
            log::debug!("{} {id}: governed tags updated", level.kind);
            updated += 1;
        } else {
            already_correct += 1;
        }
    }

    let mut created = Vec::new();
    let mut missing = 0;
    let mut needs_check = 0;
    for id in &matches.unmatched_source {
        let Some(record) = source.get(id) else { continue };

        if !level.create_missing {
            report.warn(Warning::NotInReference {
                id: id.clone(),
                name: record.name.clone(),
            });
            missing += 1;
            continue;
        }

        let placement = locate(record)?;
        match placement.quality {
            PlacementQuality::Exact => {}
            PlacementQuality::Municipality => report.warn(Warning::LocatedAtMunicipality {
                id: id.clone(),
                name: record.name.clone(),
            }),
            PlacementQuality::NotFound => report.warn(Warning::LocationNotFound {
                id: id.clone(),
                name: record.name.clone(),
            }),
        }
        if placement.needs_check() {
            needs_check += 1;
        }

        let key = level.key.as_deref().unwrap_or("ref");
        created.push(new_feature(record, key, governed, placement));
    }

    let summary = report.level_mut(level.kind);
    summary.source_records = source.len();
    summary.reference_features = features.len();
    summary.updated = updated;
    summary.already_correct = already_correct;
    summary.stale = matches.unmatched_reference.len();
    summary.created = created.len();
    summary.missing = missing;
    summary.needs_check = needs_check;

    Ok(LevelOutcome { matches, created })
}
