use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::ReconError;
use crate::id::{EntityId, EntityKind};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    /// Default output file name. `{year}` is replaced by the reporting year.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub tags: GovernedTags,
    pub levels: Vec<LevelConfig>,
    /// Composite settlement id → member municipality → mode.
    #[serde(default)]
    pub splits: BTreeMap<String, BTreeMap<String, SplitMode>>,
}

// ---------------------------------------------------------------------------
// Governed tags
// ---------------------------------------------------------------------------

/// Attribute keys the reconciler owns. Every other attribute on a feature is
/// left untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct GovernedTags {
    #[serde(default = "default_population_key")]
    pub population: String,
    #[serde(default = "default_date_key")]
    pub date: String,
    /// Optional provenance tag written with a constant value.
    #[serde(default)]
    pub source: Option<SourceTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceTag {
    pub key: String,
    pub value: String,
}

fn default_population_key() -> String {
    "population".into()
}

fn default_date_key() -> String {
    "population:date".into()
}

impl Default for GovernedTags {
    fn default() -> Self {
        Self {
            population: default_population_key(),
            date: default_date_key(),
            source: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

/// One administrative or settlement level reconciled in a run.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelConfig {
    pub kind: EntityKind,
    /// Tag holding the identifier. Not used for the country level, where
    /// every selected element is the country.
    #[serde(default)]
    pub key: Option<String>,
    /// Overpass QL query returning the reference features of this level.
    #[serde(default)]
    pub query: Option<String>,
    /// Tag conditions an element must satisfy to belong to this level.
    #[serde(default)]
    pub select: BTreeMap<String, String>,
    /// Identifiers deliberately left out of this level on both sides.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Create new features for source records with no reference feature.
    #[serde(default)]
    pub create_missing: bool,
}

impl LevelConfig {
    /// True when `tags` satisfy every `select` condition and carry the key tag.
    pub fn selects<'a>(&self, mut lookup: impl FnMut(&str) -> Option<&'a str>) -> bool {
        if let Some(key) = &self.key {
            if lookup(key).is_none() {
                return false;
            }
        }
        self.select
            .iter()
            .all(|(k, v)| lookup(k).is_some_and(|actual| actual == v))
    }

    pub fn excluded_ids(&self) -> Result<BTreeSet<EntityId>, ReconError> {
        self.exclude
            .iter()
            .map(|code| EntityId::parse(self.kind, code))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Splits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// The member is covered by the composite's total population.
    All,
    /// The member becomes a separate sub-area with its own population.
    Part,
}

/// Validated form of one `[splits]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRule {
    pub composite_id: EntityId,
    pub members: BTreeMap<String, SplitMode>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.levels.is_empty() {
            return Err(ReconError::ConfigValidation("at least one level is required".into()));
        }

        if self.tags.population.trim().is_empty() || self.tags.date.trim().is_empty() {
            return Err(ReconError::ConfigValidation("governed tag keys must not be empty".into()));
        }

        let mut seen = BTreeSet::new();
        for level in &self.levels {
            if !seen.insert(level.kind) {
                return Err(ReconError::ConfigValidation(format!(
                    "level '{}' is configured more than once",
                    level.kind
                )));
            }

            match (&level.key, level.kind) {
                (None, EntityKind::Country) => {}
                (None, kind) => {
                    return Err(ReconError::ConfigValidation(format!(
                        "level '{kind}': key tag is required"
                    )));
                }
                (Some(key), kind) if key.trim().is_empty() => {
                    return Err(ReconError::ConfigValidation(format!(
                        "level '{kind}': key tag must not be empty"
                    )));
                }
                _ => {}
            }

            level.excluded_ids().map_err(|e| {
                ReconError::ConfigValidation(format!("level '{}': exclude: {e}", level.kind))
            })?;
        }

        if !self.splits.is_empty() && !seen.contains(&EntityKind::Settlement) {
            return Err(ReconError::ConfigValidation(
                "splits require a settlement level".into(),
            ));
        }

        self.split_rules()?;
        Ok(())
    }

    pub fn level(&self, kind: EntityKind) -> Option<&LevelConfig> {
        self.levels.iter().find(|l| l.kind == kind)
    }

    /// Validated split rules, ordered by composite id.
    pub fn split_rules(&self) -> Result<Vec<SplitRule>, ReconError> {
        let mut rules = Vec::with_capacity(self.splits.len());
        for (composite, members) in &self.splits {
            let composite_id = EntityId::parse(EntityKind::Settlement, composite)
                .ok()
                .filter(|id| !id.code().contains('-'))
                .ok_or_else(|| {
                    ReconError::ConfigValidation(format!(
                        "split '{composite}': composite id must be a 4-digit settlement code"
                    ))
                })?;

            if members.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "split '{composite}': no members listed"
                )));
            }

            for member in members.keys() {
                EntityId::parse(EntityKind::Municipality, member).map_err(|_| {
                    ReconError::ConfigValidation(format!(
                        "split '{composite}': member '{member}' is not a 4-digit municipality code"
                    ))
                })?;
            }

            rules.push(SplitRule {
                composite_id,
                members: members.clone(),
            });
        }
        Ok(rules)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
