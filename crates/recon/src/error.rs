use std::fmt;

use crate::id::{EntityId, EntityKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad split rule, empty key, etc.).
    ConfigValidation(String),
    /// Identifier does not have the format required for its kind.
    InvalidId { kind: EntityKind, value: String },
    /// Population figure is not a non-negative integer.
    InvalidPopulation(String),
    /// The same identifier occurs twice in the source data.
    DuplicateSource(EntityId),
    /// The same identifier occurs on more than one reference feature.
    DuplicateReference(Vec<EntityId>),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidId { kind, value } => {
                write!(f, "invalid {kind} identifier '{value}' (expected {})", kind.format_hint())
            }
            Self::InvalidPopulation(value) => write!(f, "cannot parse population '{value}'"),
            Self::DuplicateSource(id) => write!(f, "duplicate {} '{}' in source data", id.kind(), id),
            Self::DuplicateReference(ids) => {
                let list: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(
                    f,
                    "duplicate identifier(s) in reference data: {} (remove duplicates before continuing)",
                    list.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ReconError {}
