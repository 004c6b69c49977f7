use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ReconError;
use crate::id::EntityId;

// ---------------------------------------------------------------------------
// Population
// ---------------------------------------------------------------------------

/// A population count. Displays as plain decimal digits with no separators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Population(pub u64);

impl Population {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl FromStr for Population {
    type Err = ReconError;

    /// Accepts thousands-grouped input such as `12 345` (ASCII, no-break or
    /// thin spaces). Signs, decimals and other separators are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '\u{00a0}' | '\u{202f}' | '\u{2009}'))
            .collect();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ReconError::InvalidPopulation(s.to_string()));
        }
        digits
            .parse::<u64>()
            .map(Population)
            .map_err(|_| ReconError::InvalidPopulation(s.to_string()))
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Saturates at `u64::MAX` instead of overflowing.
impl std::ops::AddAssign for Population {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

// ---------------------------------------------------------------------------
// Source side
// ---------------------------------------------------------------------------

/// One area reported inside a composite record (e.g. the part of an urban
/// settlement lying in one municipality).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRef {
    pub id: String,
    pub name: String,
    pub population: Population,
}

/// One row of official population data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub id: EntityId,
    pub name: String,
    pub population: Population,
    pub record_date: NaiveDate,
    pub parent_refs: Vec<MemberRef>,
}

/// Source records keyed by identifier. Never holds two records for one id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    records: BTreeMap<EntityId, SourceRecord>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = SourceRecord>) -> Result<Self, ReconError> {
        let mut set = Self::new();
        for record in records {
            set.insert(record)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, record: SourceRecord) -> Result<(), ReconError> {
        if self.records.contains_key(&record.id) {
            return Err(ReconError::DuplicateSource(record.id));
        }
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get(&self, id: &EntityId) -> Option<&SourceRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.records.contains_key(id)
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<SourceRecord> {
        self.records.remove(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.records.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceRecord> {
        self.records.values()
    }
}

// ---------------------------------------------------------------------------
// Reference side
// ---------------------------------------------------------------------------

/// Ordered key/value attributes. Keeps the order they were loaded in so an
/// untouched feature serializes back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<(String, String)>);

/// Outcome of setting one governed attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChange {
    Added,
    Updated,
    Unchanged,
}

impl TagChange {
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Add or overwrite `key`. Existing keys keep their position; new keys
    /// are appended.
    pub fn set(&mut self, key: &str, value: &str) -> TagChange {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) if v == value => TagChange::Unchanged,
            Some((_, v)) => {
                *v = value.to_string();
                TagChange::Updated
            }
            None => {
                self.0.push((key.to_string(), value.to_string()));
                TagChange::Added
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Node,
    Way,
    Relation,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle back to the element a feature was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementRef {
    pub element_type: ElementType,
    pub id: i64,
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.element_type, self.id)
    }
}

/// A map feature being kept in sync with official statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFeature {
    pub id: EntityId,
    pub element: ElementRef,
    pub tags: Tags,
    pub modified: bool,
}

impl ReferenceFeature {
    pub fn new(id: EntityId, element: ElementRef, tags: Tags) -> Self {
        Self {
            id,
            element,
            tags,
            modified: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Three-way partition of the identifier key space. Feature entries are
/// indices into the slice that was matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: BTreeMap<EntityId, usize>,
    pub unmatched_source: Vec<EntityId>,
    pub unmatched_reference: BTreeMap<EntityId, usize>,
}
