use std::fmt;

use serde::Serialize;

use crate::id::{EntityId, EntityKind};

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Recoverable conditions surfaced to the operator. None of these stop a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Warning {
    /// A reference feature's identifier is not in the source data.
    NotInSource { id: EntityId },
    /// A source record has no reference feature.
    NotInReference { id: EntityId, name: String },
    /// A split rule names a composite the source data does not contain.
    SplitCompositeMissing { id: EntityId },
    /// None of a split rule's members is among the composite's municipalities.
    SplitMembersUnmatched { id: EntityId, name: String },
    /// A reference feature's key tag does not hold a valid identifier.
    MalformedReferenceKey { kind: EntityKind, element: String, value: String },
    /// A new feature could only be placed at its municipality.
    LocatedAtMunicipality { id: EntityId, name: String },
    /// A new feature could not be placed at all.
    LocationNotFound { id: EntityId, name: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInSource { id } => {
                write!(f, "{} ref {id} in reference data not found in source data", id.kind())
            }
            Self::NotInReference { id, name } => {
                write!(f, "{} {id} {name} not found in reference data", id.kind())
            }
            Self::SplitCompositeMissing { id } => {
                write!(f, "settlement {id} in split table not used by source data")
            }
            Self::SplitMembersUnmatched { id, name } => {
                write!(f, "settlement {id} {name}: no split member found, settlement dropped")
            }
            Self::MalformedReferenceKey { kind, element, value } => {
                write!(f, "{element}: '{value}' is not a valid {kind} identifier")
            }
            Self::LocatedAtMunicipality { id, name } => {
                write!(f, "settlement {id} {name}: location not found, placed at municipality")
            }
            Self::LocationNotFound { id, name } => {
                write!(f, "settlement {id} {name}: location not found")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Counts for one reconciled level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub kind: EntityKind,
    pub source_records: usize,
    pub reference_features: usize,
    /// Matched features whose governed tags were already correct.
    pub already_correct: usize,
    /// Matched features with at least one added or changed tag.
    pub updated: usize,
    /// New features created for unmatched source records.
    pub created: usize,
    /// Reference features with no source record.
    pub stale: usize,
    /// Source records with no reference feature and none created.
    pub missing: usize,
    /// Created features whose location needs a manual check.
    pub needs_check: usize,
}

impl LevelSummary {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            source_records: 0,
            reference_features: 0,
            already_correct: 0,
            updated: 0,
            created: 0,
            stale: 0,
            missing: 0,
            needs_check: 0,
        }
    }
}

/// Everything a run has to say, threaded through each stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub levels: Vec<LevelSummary>,
    pub warnings: Vec<Warning>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and log it as it happens.
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn level(&self, kind: EntityKind) -> Option<&LevelSummary> {
        self.levels.iter().find(|l| l.kind == kind)
    }

    pub fn level_mut(&mut self, kind: EntityKind) -> &mut LevelSummary {
        let pos = match self.levels.iter().position(|l| l.kind == kind) {
            Some(pos) => pos,
            None => {
                self.levels.push(LevelSummary::new(kind));
                self.levels.len() - 1
            }
        };
        &mut self.levels[pos]
    }

    /// Features marked for upload across all levels.
    pub fn total_modified(&self) -> usize {
        self.levels.iter().map(|l| l.updated + l.created).sum()
    }
}
