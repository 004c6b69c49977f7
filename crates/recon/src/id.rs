//! Identifier value types.
//!
//! Statistics agencies reuse the same digit strings across levels (county
//! `03` vs municipality `0301`), so an [`EntityId`] carries its kind and two
//! ids only compare equal when both kind and code agree.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::ReconError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Country,
    County,
    Municipality,
    Settlement,
}

impl EntityKind {
    pub fn format_hint(&self) -> &'static str {
        match self {
            Self::Country => "\"0\"",
            Self::County => "2 digits",
            Self::Municipality => "4 digits",
            Self::Settlement => "4 digits, optionally followed by -NNNN",
        }
    }

    /// Plural label used in progress output.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Country => "countries",
            Self::County => "counties",
            Self::Municipality => "municipalities",
            Self::Settlement => "urban settlements",
        }
    }

    fn accepts(&self, code: &str) -> bool {
        match self {
            Self::Country => code == EntityId::COUNTRY_CODE,
            Self::County => is_digits(code, 2),
            Self::Municipality => is_digits(code, 4),
            Self::Settlement => match code.split_once('-') {
                Some((base, member)) => is_digits(base, 4) && is_digits(member, 4),
                None => is_digits(code, 4),
            },
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Country => write!(f, "country"),
            Self::County => write!(f, "county"),
            Self::Municipality => write!(f, "municipality"),
            Self::Settlement => write!(f, "settlement"),
        }
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// A validated government identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    kind: EntityKind,
    code: String,
}

impl EntityId {
    pub const COUNTRY_CODE: &'static str = "0";

    pub fn parse(kind: EntityKind, value: &str) -> Result<Self, ReconError> {
        let code = value.trim();
        if !kind.accepts(code) {
            return Err(ReconError::InvalidId {
                kind,
                value: value.to_string(),
            });
        }
        Ok(Self {
            kind,
            code: code.to_string(),
        })
    }

    pub fn country() -> Self {
        Self {
            kind: EntityKind::Country,
            code: Self::COUNTRY_CODE.to_string(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Id of the sub-area of a composite settlement lying in `member`.
    pub fn split_member(&self, member: &str) -> Result<Self, ReconError> {
        Self::parse(self.kind, &format!("{}-{}", self.code, member))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
