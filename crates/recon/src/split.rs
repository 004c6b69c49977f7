//! Settlement splits.
//!
//! Statistical urban settlements can straddle municipality borders while the
//! map holds one feature per municipal part. The split table decides, per
//! composite settlement, which member municipalities become separate
//! sub-areas (`part`) and whether the composite itself survives (at least
//! one `all` member).

use crate::config::{SplitMode, SplitRule};
use crate::error::ReconError;
use crate::model::{MemberRef, SourceRecord, SourceSet};
use crate::report::{RunReport, Warning};

/// Apply `rules` to `records`, returning the transformed set.
///
/// A composite with no `all` member is removed so its population is never
/// counted twice next to its sub-areas.
pub fn apply_splits(
    rules: &[SplitRule],
    mut records: SourceSet,
    report: &mut RunReport,
) -> Result<SourceSet, ReconError> {
    for rule in rules {
        let Some(composite) = records.get(&rule.composite_id).cloned() else {
            report.warn(Warning::SplitCompositeMissing {
                id: rule.composite_id.clone(),
            });
            continue;
        };

        let mut keep_composite = false;
        let mut parts = Vec::new();

        for member in &composite.parent_refs {
            match rule.members.get(&member.id) {
                Some(SplitMode::All) => keep_composite = true,
                Some(SplitMode::Part) => parts.push(split_record(&composite, member)?),
                None => {}
            }
        }

        if !keep_composite && parts.is_empty() {
            report.warn(Warning::SplitMembersUnmatched {
                id: composite.id.clone(),
                name: composite.name.clone(),
            });
        }

        if !keep_composite {
            records.remove(&composite.id);
        }

        log::debug!(
            "split {}: {} sub-area(s), composite {}",
            composite.id,
            parts.len(),
            if keep_composite { "kept" } else { "removed" }
        );

        for part in parts {
            records.insert(part)?;
        }
    }

    Ok(records)
}

fn split_record(composite: &SourceRecord, member: &MemberRef) -> Result<SourceRecord, ReconError> {
    Ok(SourceRecord {
        id: composite.id.split_member(&member.id)?,
        name: member.name.clone(),
        population: member.population,
        record_date: composite.record_date,
        parent_refs: vec![member.clone()],
    })
}
